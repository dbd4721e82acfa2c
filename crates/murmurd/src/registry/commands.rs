//! Registry actor commands, errors, and events.
//!
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers
//! - `Snapshot`: Point-in-time copy of the registry contents

use std::sync::Arc;

use murmur_core::{ConnectionId, UserId};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::connection::Connection;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register an authenticated, open connection.
    ///
    /// # Errors
    /// - `RegistryError::AlreadyExists` if the id is already registered
    /// - `RegistryError::NotOpen` if the connection is not in the `Open` state
    /// - `RegistryError::RegistryFull` if at maximum capacity
    Add {
        id: ConnectionId,
        connection: Arc<Connection>,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a connection, returning the removed handle.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if the id is not registered (harmless)
    Remove {
        id: ConnectionId,
        respond_to: oneshot::Sender<Result<Arc<Connection>, RegistryError>>,
    },

    /// Copy the current membership.
    Snapshot { respond_to: oneshot::Sender<Snapshot> },

    /// Check whether an id is registered.
    Contains {
        id: ConnectionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Count registered connections.
    Len { respond_to: oneshot::Sender<usize> },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A connection with this id is already registered.
    #[error("connection already exists: {0}")]
    AlreadyExists(ConnectionId),

    /// No connection with this id is registered.
    #[error("connection not found: {0}")]
    NotFound(ConnectionId),

    /// Only open connections may be registered.
    #[error("connection {0} is not open")]
    NotOpen(ConnectionId),

    /// The registry has reached its maximum capacity.
    #[error("registry is full (max: {max} connections)")]
    RegistryFull { max: usize },

    /// The actor has shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Membership changes published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A connection was registered.
    Added { id: ConnectionId, user: UserId },

    /// A connection was removed.
    Removed { id: ConnectionId },
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of registry membership, ordered by connection id.
///
/// Holding a snapshot never blocks the registry; connections removed after
/// the snapshot was taken simply fail their sends.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(ConnectionId, Arc<Connection>)>,
}

impl Snapshot {
    pub(crate) fn new(entries: Vec<(ConnectionId, Arc<Connection>)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ConnectionId, Arc<Connection>)> {
        self.entries.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = (ConnectionId, Arc<Connection>);
    type IntoIter = std::vec::IntoIter<(ConnectionId, Arc<Connection>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
