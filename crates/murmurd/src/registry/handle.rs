//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` is a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to membership events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::sync::Arc;

use murmur_core::ConnectionId;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent, Snapshot};
use crate::connection::Connection;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// handle.add(Arc::clone(&connection)).await?;
/// let snapshot = handle.snapshot().await;
/// handle.remove(connection.id()).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to membership changes
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Registers an open connection under its own id.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyExists` if the id is already registered
    /// - `RegistryError::NotOpen` if the connection is not open
    /// - `RegistryError::RegistryFull` if at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn add(&self, connection: Arc<Connection>) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Add {
                id: connection.id(),
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Removes a connection.
    ///
    /// Removing an id that is not registered returns
    /// `RegistryError::NotFound` and changes nothing.
    pub async fn remove(&self, id: ConnectionId) -> Result<Arc<Connection>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove { id, respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Copies the current membership.
    ///
    /// Returns an empty snapshot if communication with the actor fails.
    pub async fn snapshot(&self) -> Snapshot {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Snapshot::default();
        }

        rx.await.unwrap_or_default()
    }

    /// Returns `false` if the id is unknown or the actor is gone.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Contains { id, respond_to: tx })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Number of registered connections, or zero if the actor is gone.
    pub async fn len(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Len { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Subscribes to membership events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Returns `true` while the command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
