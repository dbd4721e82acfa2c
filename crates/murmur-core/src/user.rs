//! User accounts.

use crate::{DomainError, DomainResult, UserId};
use serde::{Deserialize, Serialize};

/// A registered user.
///
/// `password_hash` is a bcrypt hash and never leaves the daemon;
/// use [`UserView`] for anything sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl User {
    /// The label used in chat frames.
    pub fn label(&self) -> &str {
        &self.username
    }

    /// Public projection of this user.
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
        }
    }
}

/// Registration data for a user that does not exist yet.
///
/// The password is already hashed by the time this reaches a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl NewUser {
    /// Checks the fields a directory relies on.
    pub fn validate(&self) -> DomainResult<()> {
        if self.username.trim().is_empty() {
            return Err(DomainError::invalid_field(
                "username",
                &self.username,
                "a non-empty name",
            ));
        }
        let valid_email = self
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(DomainError::invalid_field(
                "email",
                &self.email,
                "an address like name@example.com",
            ));
        }
        Ok(())
    }

    /// Attaches an id, producing a stored user.
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            full_name: self.full_name,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            full_name: "Test User".to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$2b$04$hash".to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_plain_address() {
        assert!(new_user("alice", "alice@example.com").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        for email in ["", "alice", "@example.com", "alice@localhost"] {
            let err = new_user("alice", email).validate().unwrap_err();
            assert!(matches!(err, DomainError::InvalidFieldValue { ref field, .. } if field == "email"));
        }
    }

    #[test]
    fn test_validate_rejects_blank_username() {
        assert!(new_user("  ", "a@b.io").validate().is_err());
    }

    #[test]
    fn test_label_and_view() {
        let user = new_user("bob", "bob@example.com").into_user(UserId::new(3));
        assert_eq!(user.label(), "bob");
        let view = user.view();
        assert_eq!(view.id, UserId::new(3));
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("password"));
    }
}
