//! Connection registry using the Actor pattern.
//!
//! The registry is the single source of truth for which connections are
//! live. One task owns the map and processes commands sequentially, so
//! add, remove and snapshot are mutually exclusive without any lock being
//! held across network I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ ConnectionSession│────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └──────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │   RegistryCommand     │   RegistryEvent        │
//!         │   (mpsc channel)      │   (broadcast)          │
//!         ▼                       ▼                        ▼
//!     Add/Remove/           BTreeMap<ConnectionId,    log subscribers
//!     Snapshot              Arc<Connection>>
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, DEFAULT_MAX_CONNECTIONS};
pub use commands::{RegistryCommand, RegistryError, RegistryEvent, Snapshot};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// # Example
///
/// ```no_run
/// use murmurd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(1024);
///     let snapshot = handle.snapshot().await;
///     assert!(snapshot.is_empty());
/// }
/// ```
pub fn spawn_registry(max_connections: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), max_connections);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
