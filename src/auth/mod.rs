pub mod provider;
pub mod session;
pub mod state;
pub mod validation;

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

pub use provider::{AuthGrant, AuthProvider, SqliteAuthProvider};

/// Lowest work factor bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;
/// Highest work factor bcrypt accepts.
pub const MAX_BCRYPT_COST: u32 = 31;
pub use state::{AuthSession, AuthState};

/// Who is making the call. Stamps ownership on writes and scopes like and
/// profile lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Reset token invalid or expired")]
    InvalidResetToken,

    #[error("Invalid auth transition: {0}")]
    InvalidTransition(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}
