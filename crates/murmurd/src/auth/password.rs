//! Password hashing.
//!
//! bcrypt is CPU-bound, so both operations run on the blocking pool.

use super::AuthError;

/// bcrypt cost used when none is configured.
pub const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Hashes `password` with the given bcrypt cost.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("task join error: {e}")))?
}

/// Returns `Ok(true)` if `password` matches `hash`.
///
/// # Errors
/// Returns `AuthError::Hashing` if `hash` is not a valid bcrypt hash.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let hash = hash.to_string();

    tokio::task::spawn_blocking(move || {
        bcrypt::verify(password, &hash).map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("task join error: {e}")))?
}
