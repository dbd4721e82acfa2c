//! Registration and login.

use std::sync::Arc;

use murmur_core::{DomainError, NewUser, UserView};
use murmur_protocol::{LoginForm, RegisterRequest, TokenResponse};
use thiserror::Error;
use tracing::{debug, info};

use super::directory::{DirectoryError, UserDirectory};
use super::password::{hash_password, verify_password};
use super::token::TokenService;
use super::AuthError;

/// Errors from the account endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid Credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Invalid(#[from] DomainError),

    /// The request body could not be decoded
    #[error("{0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Internal(#[from] AuthError),
}

/// Creates users and exchanges credentials for tokens.
#[derive(Clone)]
pub struct AccountService {
    directory: Arc<dyn UserDirectory>,
    tokens: TokenService,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(directory: Arc<dyn UserDirectory>, tokens: TokenService, bcrypt_cost: u32) -> Self {
        Self {
            directory,
            tokens,
            bcrypt_cost,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<UserView, AccountError> {
        let mut new_user = NewUser {
            full_name: request.full_name,
            username: request.username,
            email: request.email,
            password_hash: String::new(),
        };

        // Malformed or taken emails never reach the hasher
        new_user.validate()?;
        if self.directory.find_by_email(&new_user.email).await.is_some() {
            return Err(AccountError::EmailTaken);
        }

        new_user.password_hash = hash_password(&request.password, self.bcrypt_cost).await?;
        let user = self
            .directory
            .create(new_user)
            .await
            .map_err(|e| match e {
                DirectoryError::EmailTaken(_) => AccountError::EmailTaken,
                DirectoryError::Invalid(e) => AccountError::Invalid(e),
            })?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user.view())
    }

    /// `form.username` carries the email address.
    pub async fn login(&self, form: LoginForm) -> Result<TokenResponse, AccountError> {
        let Some(user) = self.directory.find_by_email(&form.username).await else {
            debug!("Login for unknown email");
            return Err(AccountError::InvalidCredentials);
        };

        if !verify_password(&form.password, &user.password_hash).await? {
            debug!(user_id = %user.id, "Login with wrong password");
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.tokens.issue_token(user.id)?;
        debug!(user_id = %user.id, "Issued access token");
        Ok(TokenResponse::bearer(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryUserDirectory;
    use std::time::Duration;

    fn service() -> (AccountService, TokenService) {
        let tokens = TokenService::new(b"accounts-secret", Duration::from_secs(600));
        let service = AccountService::new(
            Arc::new(InMemoryUserDirectory::new()),
            tokens.clone(),
            4,
        );
        (service, tokens)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            full_name: "Bob Builder".to_string(),
            username: "bob".to_string(),
            email: email.to_string(),
            password: "can-we-fix-it".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (service, tokens) = service();
        let view = service.register(register_request("bob@example.com")).await.unwrap();
        assert_eq!(view.username, "bob");

        let response = service
            .login(LoginForm {
                username: "bob@example.com".to_string(),
                password: "can-we-fix-it".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(response.token_type, "bearer");
        assert_eq!(tokens.verify_token(&response.access_token).unwrap(), view.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (service, _) = service();
        service.register(register_request("bob@example.com")).await.unwrap();
        let err = service
            .register(register_request("bob@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err, AccountError::EmailTaken);
        assert_eq!(err.to_string(), "Email already registered");
    }

    #[tokio::test]
    async fn test_register_invalid_email() {
        let (service, _) = service();
        let err = service.register(register_request("bob")).await.unwrap_err();
        assert!(matches!(err, AccountError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_hashing() {
        // Cost 2 is refused by bcrypt, so any hash attempt would surface as Internal
        let tokens = TokenService::new(b"accounts-secret", Duration::from_secs(600));
        let directory = Arc::new(InMemoryUserDirectory::new());
        let service = AccountService::new(directory.clone(), tokens, 2);

        let err = service.register(register_request("not-an-email")).await.unwrap_err();
        assert!(matches!(err, AccountError::Invalid(_)), "got {err:?}");

        let mut blank_name = register_request("bob@example.com");
        blank_name.username = "  ".to_string();
        let err = service.register(blank_name).await.unwrap_err();
        assert!(matches!(err, AccountError::Invalid(_)), "got {err:?}");

        assert_eq!(directory.len().await, 0);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (service, _) = service();
        service.register(register_request("bob@example.com")).await.unwrap();

        let err = service
            .login(LoginForm {
                username: "bob@example.com".to_string(),
                password: "no-we-cant".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, AccountError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let (service, _) = service();
        let err = service
            .login(LoginForm {
                username: "nobody@example.com".to_string(),
                password: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid Credentials");
    }
}
