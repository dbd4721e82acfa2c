//! Authentication: tokens, password hashing and the user directory.
//!
//! The session layer only sees the [`Authenticate`] trait. The concrete
//! [`Authenticator`] verifies an HS256 token and resolves its user through
//! a [`UserDirectory`].

mod accounts;
mod directory;
mod password;
mod token;

use std::sync::Arc;

use async_trait::async_trait;
use murmur_core::UserId;
use murmur_protocol::CloseReason;
use thiserror::Error;

pub use accounts::{AccountError, AccountService};
pub use directory::{DirectoryError, InMemoryUserDirectory, UserDirectory};
pub use password::{hash_password, verify_password, DEFAULT_BCRYPT_COST};
pub use token::{Claims, TokenService};

/// An authenticated user as seen by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,

    /// Name shown in chat frames
    pub label: String,
}

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("user not found")]
    UserNotFound,

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl AuthError {
    /// Close reason sent to a client whose handshake failed with this error.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            AuthError::UserNotFound => CloseReason::UserNotFound,
            _ => CloseReason::InvalidToken,
        }
    }
}

/// Resolves a bearer token to a user.
#[async_trait]
pub trait Authenticate: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Token verification backed by a user directory.
#[derive(Clone)]
pub struct Authenticator {
    tokens: TokenService,
    directory: Arc<dyn UserDirectory>,
}

impl Authenticator {
    pub fn new(tokens: TokenService, directory: Arc<dyn UserDirectory>) -> Self {
        Self { tokens, directory }
    }
}

#[async_trait]
impl Authenticate for Authenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let user_id = self.tokens.verify_token(token)?;
        let user = self
            .directory
            .get(user_id)
            .await
            .ok_or(AuthError::UserNotFound)?;

        Ok(Principal {
            user_id: user.id,
            label: user.label().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::NewUser;
    use std::time::Duration;

    fn setup() -> (Authenticator, TokenService, Arc<InMemoryUserDirectory>) {
        let tokens = TokenService::new(b"test-secret", Duration::from_secs(60));
        let directory = Arc::new(InMemoryUserDirectory::new());
        let auth = Authenticator::new(tokens.clone(), directory.clone());
        (auth, tokens, directory)
    }

    #[tokio::test]
    async fn test_authenticate_resolves_label() {
        let (auth, tokens, directory) = setup();
        let user = directory
            .create(NewUser {
                full_name: "Alice Liddell".to_string(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();

        let token = tokens.issue_token(user.id).unwrap();
        let principal = auth.authenticate(&token).await.unwrap();

        assert_eq!(principal.user_id, user.id);
        assert_eq!(principal.label, "alice");
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let (auth, tokens, _) = setup();
        let token = tokens.issue_token(UserId::new(42)).unwrap();

        let err = auth.authenticate(&token).await.unwrap_err();
        assert_eq!(err, AuthError::UserNotFound);
        assert_eq!(err.close_reason(), CloseReason::UserNotFound);
    }

    #[tokio::test]
    async fn test_authenticate_garbage() {
        let (auth, _, _) = setup();
        let err = auth.authenticate("not-a-jwt").await.unwrap_err();
        assert_eq!(err, AuthError::Malformed);
        assert_eq!(err.close_reason(), CloseReason::InvalidToken);
    }
}
