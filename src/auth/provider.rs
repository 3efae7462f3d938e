use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;

use super::session;
use super::validation::{self, validate_credentials, validate_email};
use super::{AuthError, Identity};
use crate::db::models::UserProfile;
use crate::db::DbPool;
use crate::store::DocumentStore;

/// Result of a successful sign-in or sign-up.
#[derive(Debug, Clone, Serialize)]
pub struct AuthGrant {
    #[serde(flatten)]
    pub identity: Identity,
    pub token: String,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create an account and its empty profile document.
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    /// Issue a reset token for the address. Unknown addresses succeed
    /// silently so the endpoint can't be used to enumerate accounts.
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Consume a reset token and set a new password.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    /// Current identity for a session token, if the session is live.
    async fn identity(&self, token: &str) -> Result<Option<Identity>, AuthError>;
}

/// Email and password accounts stored next to the documents, bcrypt hashed.
pub struct SqliteAuthProvider {
    pool: DbPool,
    store: Arc<dyn DocumentStore>,
    session_hours: u64,
    reset_token_minutes: u64,
    hash_cost: u32,
}

impl SqliteAuthProvider {
    pub fn new(
        pool: DbPool,
        store: Arc<dyn DocumentStore>,
        session_hours: u64,
        reset_token_minutes: u64,
    ) -> Self {
        Self {
            pool,
            store,
            session_hours,
            reset_token_minutes,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Lower the bcrypt cost. Tests use [`MIN_BCRYPT_COST`](super::MIN_BCRYPT_COST).
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    fn find_account(&self, email: &str) -> Result<Option<(String, String)>, AuthError> {
        let conn = self.pool.get()?;
        let account = conn
            .query_row(
                "SELECT id, password_hash FROM accounts WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(account)
    }

    fn grant(&self, user_id: String, email: String) -> Result<AuthGrant, AuthError> {
        let token = session::create_session(&self.pool, &user_id, self.session_hours)?;
        Ok(AuthGrant {
            identity: Identity { user_id, email },
            token,
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

#[async_trait]
impl AuthProvider for SqliteAuthProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError> {
        validate_credentials(email, password)?;
        let email = normalize_email(email);

        if self.find_account(&email)?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let user_id = uuid::Uuid::now_v7().to_string();
        let hash = bcrypt::hash(password, self.hash_cost)?;
        {
            let conn = self.pool.get()?;
            conn.execute(
                "INSERT INTO accounts (id, email, password_hash) VALUES (?1, ?2, ?3)",
                params![user_id, email, hash],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    AuthError::EmailTaken
                }
                other => other.into(),
            })?;
        }

        self.store
            .put_profile(&UserProfile::empty(user_id.clone(), email.clone()))
            .await?;

        tracing::info!(user_id = %user_id, "account registered");
        self.grant(user_id, email)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError> {
        validate_credentials(email, password)?;
        let email = normalize_email(email);

        let (user_id, hash) = self
            .find_account(&email)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !bcrypt::verify(password, &hash).unwrap_or(false) {
            tracing::debug!(user_id = %user_id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        self.grant(user_id, email)
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        if !session::delete_session(&self.pool, token)? {
            return Err(AuthError::Unauthenticated);
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        let email = normalize_email(email);

        let Some((user_id, _)) = self.find_account(&email)? else {
            tracing::debug!("password reset requested for unknown address");
            return Ok(());
        };

        let token = session::generate_token();
        {
            let conn = self.pool.get()?;
            conn.execute(
                "INSERT INTO password_resets (token, account_id, expires_at)
                 VALUES (?1, ?2, datetime('now', ?3))",
                params![
                    token,
                    user_id,
                    format!("+{} minutes", self.reset_token_minutes)
                ],
            )?;
        }

        // No mail transport here: the mail log is the delivery channel.
        tracing::info!(
            target: "treinos::mail",
            to = %email,
            reset_token = %token,
            "password reset email dispatched"
        );
        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        if !validation::is_strong_password(new_password) {
            return Err(AuthError::Validation(validation::WEAK_PASSWORD.to_string()));
        }

        let hash = bcrypt::hash(new_password, self.hash_cost)?;
        let conn = self.pool.get()?;

        let account_id: Option<String> = conn
            .query_row(
                "SELECT account_id FROM password_resets
                 WHERE token = ?1 AND used_at IS NULL AND expires_at > datetime('now')",
                params![token],
                |row| row.get(0),
            )
            .optional()?;
        let account_id = account_id.ok_or(AuthError::InvalidResetToken)?;

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result: Result<(), AuthError> = (|| {
            conn.execute(
                "UPDATE password_resets SET used_at = datetime('now') WHERE token = ?1",
                params![token],
            )?;
            conn.execute(
                "UPDATE accounts SET password_hash = ?2 WHERE id = ?1",
                params![account_id, hash],
            )?;
            // Old sessions die with the old password
            conn.execute(
                "DELETE FROM sessions WHERE account_id = ?1",
                params![account_id],
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                tracing::info!(user_id = %account_id, "password reset completed");
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    async fn identity(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        session::find_session(&self.pool, token)
    }
}
