//! Credential checks that run before any store or network call.

use once_cell::sync::Lazy;
use regex::Regex;

use super::AuthError;

pub const MISSING_CREDENTIALS: &str = "Informe o e-mail e senha.";
pub const INVALID_EMAIL: &str = "E-mail inválido";
pub const WEAK_PASSWORD: &str =
    "A senha deve conter no mínimo 8 caracteres, letra maiúscula, minúscula, número e símbolo";

const MIN_PASSWORD_LEN: usize = 8;

// Same pattern the app's sign-up form checks before calling the server
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("hardcoded email regex is invalid")
});

/// `local@domain.tld`: no whitespace, exactly one `@`, and a dot in the
/// domain with something on both sides of it.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::Validation(MISSING_CREDENTIALS.to_string()));
    }
    if !is_valid_email(email) {
        return Err(AuthError::Validation(INVALID_EMAIL.to_string()));
    }
    Ok(())
}

/// Same checks the login and registration forms apply, in the same order.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::Validation(MISSING_CREDENTIALS.to_string()));
    }
    validate_email(email)?;
    if !is_strong_password(password) {
        return Err(AuthError::Validation(WEAK_PASSWORD.to_string()));
    }
    Ok(())
}
