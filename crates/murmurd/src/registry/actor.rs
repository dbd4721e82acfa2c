//! Registry actor - owns the connection map and processes commands.
//!
//! The RegistryActor is the single owner of membership state. Commands
//! arrive over an mpsc channel and are handled one at a time, so every
//! add, remove and snapshot observes a consistent map.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are ignored; the caller may have gone away

use std::collections::BTreeMap;
use std::sync::Arc;

use murmur_core::{ConnectionId, ConnectionState};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent, Snapshot};
use crate::connection::Connection;

// ============================================================================
// Resource Limits
// ============================================================================

/// Default maximum number of registered connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all connection membership.
///
/// # Ownership
///
/// The actor owns `connections`, keyed by [`ConnectionId`]. A `BTreeMap`
/// keeps snapshots in id order, which makes broadcast delivery order
/// deterministic.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Registered connections
    connections: BTreeMap<ConnectionId, Arc<Connection>>,

    /// Capacity limit
    max_connections: usize,

    /// Membership change publisher
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// A `max_connections` of zero is treated as one.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        max_connections: usize,
    ) -> Self {
        Self {
            receiver,
            connections: BTreeMap::new(),
            max_connections: max_connections.max(1),
            event_publisher,
        }
    }

    /// Runs the actor loop until every handle has been dropped.
    pub async fn run(mut self) {
        info!(max = self.max_connections, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            "Registry actor stopped (connections: {})",
            self.connections.len()
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Add {
                id,
                connection,
                respond_to,
            } => {
                let result = self.handle_add(id, connection);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove { id, respond_to } => {
                let result = self.handle_remove(id);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.handle_snapshot());
            }
            RegistryCommand::Contains { id, respond_to } => {
                let _ = respond_to.send(self.connections.contains_key(&id));
            }
            RegistryCommand::Len { respond_to } => {
                let _ = respond_to.send(self.connections.len());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_add(
        &mut self,
        id: ConnectionId,
        connection: Arc<Connection>,
    ) -> Result<(), RegistryError> {
        if self.connections.contains_key(&id) {
            debug!(connection_id = %id, "Rejecting duplicate registration");
            return Err(RegistryError::AlreadyExists(id));
        }

        let user = match connection.principal() {
            Some(principal) if connection.state() == ConnectionState::Open => principal.user_id,
            _ => {
                debug!(
                    connection_id = %id,
                    state = connection.state().as_str(),
                    "Rejecting registration of connection that is not open"
                );
                return Err(RegistryError::NotOpen(id));
            }
        };

        if self.connections.len() >= self.max_connections {
            warn!(
                connection_id = %id,
                current = self.connections.len(),
                max = self.max_connections,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_connections,
            });
        }

        self.connections.insert(id, connection);
        debug!(
            connection_id = %id,
            user_id = %user,
            total = self.connections.len(),
            "Connection registered"
        );

        let _ = self.event_publisher.send(RegistryEvent::Added { id, user });
        Ok(())
    }

    fn handle_remove(&mut self, id: ConnectionId) -> Result<Arc<Connection>, RegistryError> {
        let Some(connection) = self.connections.remove(&id) else {
            return Err(RegistryError::NotFound(id));
        };

        debug!(
            connection_id = %id,
            remaining = self.connections.len(),
            "Connection removed"
        );

        let _ = self.event_publisher.send(RegistryEvent::Removed { id });
        Ok(connection)
    }

    fn handle_snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.connections
                .iter()
                .map(|(id, conn)| (*id, Arc::clone(conn)))
                .collect(),
        )
    }

    /// Returns the number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
