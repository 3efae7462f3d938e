use rand::Rng;
use rusqlite::{params, OptionalExtension};

use super::{AuthError, Identity};
use crate::db::DbPool;

/// Create a new session for an account. Returns the session token.
pub fn create_session(pool: &DbPool, account_id: &str, hours: u64) -> Result<String, AuthError> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, account_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, account_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Resolve a live session token to the identity that owns it.
pub fn find_session(pool: &DbPool, token: &str) -> Result<Option<Identity>, AuthError> {
    let conn = pool.get()?;
    let identity = conn
        .query_row(
            "SELECT a.id, a.email FROM sessions s \
             JOIN accounts a ON a.id = s.account_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(Identity {
                    user_id: row.get(0)?,
                    email: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(identity)
}

/// Delete a session by token. Returns false if it was already gone.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<bool, AuthError> {
    let conn = pool.get()?;
    let rows = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(rows > 0)
}

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
