//! User storage.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use murmur_core::{DomainError, NewUser, User, UserId};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// Lookup and creation of user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Stores a new user and assigns its id.
    async fn create(&self, new_user: NewUser) -> Result<User, DirectoryError>;

    async fn find_by_email(&self, email: &str) -> Option<User>;

    async fn get(&self, id: UserId) -> Option<User>;

    async fn len(&self) -> usize;
}

#[derive(Debug, Default)]
struct Users {
    /// Last id handed out; ids start at 1
    last_id: u64,
    by_id: BTreeMap<UserId, User>,
    by_email: HashMap<String, UserId>,
}

/// Directory that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<Users>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn create(&self, new_user: NewUser) -> Result<User, DirectoryError> {
        new_user.validate()?;

        let mut users = self.users.write().await;
        if users.by_email.contains_key(&new_user.email) {
            return Err(DirectoryError::EmailTaken(new_user.email));
        }

        users.last_id += 1;
        let user = new_user.into_user(UserId::new(users.last_id));
        users.by_email.insert(user.email.clone(), user.id);
        users.by_id.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        let users = self.users.read().await;
        let id = users.by_email.get(email)?;
        users.by_id.get(id).cloned()
    }

    async fn get(&self, id: UserId) -> Option<User> {
        self.users.read().await.by_id.get(&id).cloned()
    }

    async fn len(&self) -> usize {
        self.users.read().await.by_id.len()
    }
}
