//! Fanout of outbound frames to registered connections.
//!
//! The engine never iterates the live registry. It takes a snapshot,
//! renders the frame once and sends it to every member concurrently, each
//! send bounded by the configured timeout. A failed recipient is not
//! removed here: its failure signal is raised and its own session runs the
//! cleanup.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A failing recipient never aborts delivery to the others

use std::time::Duration;

use futures::future::join_all;
use murmur_core::{ChatMessage, ConnectionId};
use murmur_protocol::OutboundFrame;
use tracing::debug;

use crate::connection::SendError;
use crate::registry::RegistryHandle;

/// Default bound on a single send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of sending one frame to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: ConnectionId,
    pub result: Result<(), SendError>,
}

/// Per-recipient results of one broadcast, in connection id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub deliveries: Vec<Delivery>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.deliveries.len()
    }

    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.result.is_ok()).count()
    }

    /// Ids whose send failed or timed out.
    pub fn failed(&self) -> Vec<ConnectionId> {
        self.deliveries
            .iter()
            .filter(|d| d.result.is_err())
            .map(|d| d.id)
            .collect()
    }
}

/// Sends frames to every registered connection.
#[derive(Clone)]
pub struct BroadcastEngine {
    registry: RegistryHandle,
    send_timeout: Duration,
    echo_to_sender: bool,
}

impl BroadcastEngine {
    pub fn new(registry: RegistryHandle, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
            echo_to_sender: false,
        }
    }

    /// Whether chat messages are also delivered back to their sender.
    pub fn with_echo_to_sender(mut self, echo: bool) -> Self {
        self.echo_to_sender = echo;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Sends `frame` to every registered connection except `exclude`.
    pub async fn broadcast(
        &self,
        frame: &OutboundFrame,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport {
        let snapshot = self.registry.snapshot().await;
        let text = frame.render();

        let sends = snapshot
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .map(|(id, conn)| {
                let text = text.as_str();
                async move {
                    let result = conn.send_text(text, self.send_timeout).await;
                    if let Err(e) = &result {
                        debug!(connection = %id, error = %e, "Send failed, signalling session");
                        conn.signal_failure();
                    }
                    Delivery { id: *id, result }
                }
            });

        let report = BroadcastReport {
            deliveries: join_all(sends).await,
        };

        debug!(
            recipients = report.attempted(),
            failed = report.attempted() - report.delivered(),
            "Broadcast complete"
        );
        report
    }

    /// Relays a chat message from connection `from`.
    pub async fn relay(&self, message: &ChatMessage, from: ConnectionId) -> BroadcastReport {
        let exclude = if self.echo_to_sender { None } else { Some(from) };
        self.broadcast(&OutboundFrame::from(message), exclude).await
    }

    /// Tells everyone else that `label` has joined.
    pub async fn announce_joined(&self, label: &str, id: ConnectionId) -> BroadcastReport {
        self.broadcast(&OutboundFrame::joined(label), Some(id)).await
    }

    /// Tells everyone still registered that `label` has left.
    pub async fn announce_left(&self, label: &str) -> BroadcastReport {
        self.broadcast(&OutboundFrame::left(label), None).await
    }
}
