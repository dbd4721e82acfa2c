//! Per-connection session driving one client from handshake to close.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──▶ Authenticating ──▶ Active ──▶ Closing ──▶ Closed
//!                      │                │
//!                      └── rejected ────┴──▶ Closed (close frame, never registered)
//! ```
//!
//! A session authenticates the bearer token, registers its connection,
//! then relays every inbound text frame through the [`BroadcastEngine`].
//! The receive loop ends on a client close, a transport error, the idle
//! timeout, server shutdown, or the connection's failure signal. All of
//! those paths converge on a single cleanup that removes the connection
//! and announces the departure exactly once.
//!
//! # Keepalive
//!
//! The idle timeout is off by default, so a client that only listens stays
//! connected for as long as its socket does. When an idle timeout is set,
//! the session pings the client every half window and any inbound frame,
//! pongs included, restarts the window.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors end the session; they never propagate further

use std::sync::Arc;
use std::time::Duration;

use murmur_core::{ChatMessage, ConnectionState};
use murmur_protocol::{extract_bearer_token, CloseReason};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{Authenticate, Principal};
use crate::broadcast::BroadcastEngine;
use crate::connection::Connection;
use crate::registry::{RegistryError, RegistryHandle};
use crate::transport::{FrameSource, Inbound, TransportError};

/// Default maximum inbound message size in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Token sources presented at connection time.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Value of the `token` query parameter
    pub query_token: Option<String>,

    /// Raw `Authorization` header
    pub authorization: Option<String>,
}

/// Limits applied to every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Close after this long without any inbound frame; `None` disables it
    /// along with keepalive pings
    pub idle_timeout: Option<Duration>,
    pub max_message_bytes: usize,
}

impl SessionSettings {
    /// Interval between keepalive pings, if any.
    pub fn keepalive_interval(&self) -> Option<Duration> {
        self.idle_timeout.map(|idle| (idle / 2).max(Duration::from_millis(1)))
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Collaborators shared by all sessions.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: RegistryHandle,
    pub broadcaster: BroadcastEngine,
    pub authenticator: Arc<dyn Authenticate>,
    pub settings: SessionSettings,

    /// Cancelled on server shutdown
    pub shutdown: CancellationToken,
}

/// Why an active session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Client sent a close frame
    ClientClosed,

    /// Stream ended without a close frame
    StreamEnded,

    Transport(String),
    IdleTimeout,

    /// A send to this client failed
    SendFailure,

    Shutdown,
}

impl DisconnectCause {
    /// Close frame the server sends for this cause.
    fn close_frame(&self) -> (Option<u16>, &'static str) {
        match self {
            DisconnectCause::IdleTimeout => (
                Some(CloseReason::IdleTimeout.code()),
                CloseReason::IdleTimeout.reason(),
            ),
            DisconnectCause::Shutdown => (
                Some(CloseReason::ShuttingDown.code()),
                CloseReason::ShuttingDown.reason(),
            ),
            _ => (None, ""),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Refused before becoming active; never visible to a broadcast
    Rejected(CloseReason),

    /// Was active and has been cleaned up
    Closed(DisconnectCause),
}

/// Result of one read from the client.
enum Read {
    Frame(Inbound),
    Ended,
    Failed(TransportError),
}

/// Drives one connection through its lifecycle.
pub struct ConnectionSession {
    connection: Arc<Connection>,
    ctx: SessionContext,
}

impl ConnectionSession {
    pub fn new(connection: Arc<Connection>, ctx: SessionContext) -> Self {
        Self { connection, ctx }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Runs the session to completion.
    pub async fn run<S: FrameSource>(self, mut source: S, credentials: Credentials) -> SessionOutcome {
        let principal = match self.authenticate(&credentials).await {
            Ok(principal) => principal,
            Err(reason) => {
                self.reject(reason).await;
                return SessionOutcome::Rejected(reason);
            }
        };

        if let Err(reason) = self.activate(principal).await {
            return SessionOutcome::Rejected(reason);
        }

        let cause = self.receive_loop(&mut source).await;
        self.finish(&cause).await;
        SessionOutcome::Closed(cause)
    }

    // ========================================================================
    // Authenticating
    // ========================================================================

    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal, CloseReason> {
        let id = self.connection.id();
        let token = extract_bearer_token(
            credentials.query_token.as_deref(),
            credentials.authorization.as_deref(),
        )
        .map_err(|e| {
            info!(connection = %id, error = %e, "Rejecting connection without token");
            CloseReason::MissingToken
        })?;

        self.ctx
            .authenticator
            .authenticate(token)
            .await
            .map_err(|e| {
                info!(connection = %id, error = %e, "Rejecting connection with bad token");
                e.close_reason()
            })
    }

    async fn reject(&self, reason: CloseReason) {
        self.connection
            .close(Some(reason.code()), reason.reason(), self.ctx.broadcaster.send_timeout())
            .await;
        if let Err(e) = self
            .connection
            .transition(ConnectionState::Connecting, ConnectionState::Closed)
        {
            debug!(connection = %self.connection.id(), error = %e, "Unexpected state on reject");
        }
    }

    // ========================================================================
    // Active
    // ========================================================================

    async fn activate(&self, principal: Principal) -> Result<(), CloseReason> {
        let id = self.connection.id();
        let label = principal.label.clone();
        self.connection.authenticate(principal);

        if self
            .connection
            .transition(ConnectionState::Connecting, ConnectionState::Open)
            .is_err()
        {
            self.reject(CloseReason::ShuttingDown).await;
            return Err(CloseReason::ShuttingDown);
        }

        if let Err(e) = self.ctx.registry.add(Arc::clone(&self.connection)).await {
            let reason = match e {
                RegistryError::AlreadyExists(_) => CloseReason::DuplicateConnection,
                RegistryError::RegistryFull { .. } => CloseReason::ServerFull,
                _ => CloseReason::ShuttingDown,
            };
            warn!(connection = %id, user = %label, error = %e, "Registration refused");

            let _ = self
                .connection
                .transition(ConnectionState::Open, ConnectionState::Closing);
            self.connection
                .close(Some(reason.code()), reason.reason(), self.ctx.broadcaster.send_timeout())
                .await;
            let _ = self
                .connection
                .transition(ConnectionState::Closing, ConnectionState::Closed);
            return Err(reason);
        }

        info!(connection = %id, user = %label, "Client joined");
        self.ctx.broadcaster.announce_joined(&label, id).await;
        Ok(())
    }

    async fn receive_loop<S: FrameSource>(&self, source: &mut S) -> DisconnectCause {
        let id = self.connection.id();
        let Some(principal) = self.connection.principal().cloned() else {
            return DisconnectCause::StreamEnded;
        };

        let idle = self.ctx.settings.idle_timeout;
        let mut deadline = idle.map(|limit| Instant::now() + limit);
        let mut keepalive = self.ctx.settings.keepalive_interval().map(|period| {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks
        });

        loop {
            let read = tokio::select! {
                biased;

                _ = self.ctx.shutdown.cancelled() => return DisconnectCause::Shutdown,
                _ = self.connection.failure() => return DisconnectCause::SendFailure,
                _ = idle_elapsed(deadline) => return DisconnectCause::IdleTimeout,
                _ = next_tick(&mut keepalive) => {
                    self.ping().await;
                    continue;
                }
                read = read_frame(source) => read,
            };

            if let Some(limit) = idle {
                deadline = Some(Instant::now() + limit);
            }

            let text = match read {
                Read::Frame(Inbound::Text(text)) => text,
                Read::Frame(Inbound::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(connection = %id, "Ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Read::Frame(Inbound::Control) => continue,
                Read::Frame(Inbound::Close) => return DisconnectCause::ClientClosed,
                Read::Ended => return DisconnectCause::StreamEnded,
                Read::Failed(e) => return DisconnectCause::Transport(e.to_string()),
            };

            if text.len() > self.ctx.settings.max_message_bytes {
                warn!(
                    connection = %id,
                    len = text.len(),
                    max = self.ctx.settings.max_message_bytes,
                    "Dropping oversized message"
                );
                continue;
            }

            let message = ChatMessage::new(principal.user_id, principal.label.as_str(), text);
            if message.is_blank() {
                continue;
            }

            debug!(connection = %id, user = %principal.label, len = message.text.len(), "Relaying message");
            self.ctx.broadcaster.relay(&message, id).await;
        }
    }

    async fn ping(&self) {
        if let Err(e) = self
            .connection
            .send_ping(self.ctx.broadcaster.send_timeout())
            .await
        {
            debug!(connection = %self.connection.id(), error = %e, "Keepalive ping failed");
            self.connection.signal_failure();
        }
    }

    // ========================================================================
    // Closing
    // ========================================================================

    async fn finish(&self, cause: &DisconnectCause) {
        let id = self.connection.id();
        if self
            .connection
            .transition(ConnectionState::Open, ConnectionState::Closing)
            .is_err()
        {
            debug!(connection = %id, "Cleanup already ran");
            return;
        }

        match self.ctx.registry.remove(id).await {
            Ok(_) => {}
            Err(RegistryError::NotFound(_)) => {
                debug!(connection = %id, "Connection was not registered");
            }
            Err(e) => warn!(connection = %id, error = %e, "Failed to remove connection"),
        }

        let label = self.connection.label();
        self.ctx.broadcaster.announce_left(&label).await;

        let (code, reason) = cause.close_frame();
        self.connection
            .close(code, reason, self.ctx.broadcaster.send_timeout())
            .await;

        let _ = self
            .connection
            .transition(ConnectionState::Closing, ConnectionState::Closed);
        info!(connection = %id, user = %label, cause = ?cause, "Client left");
    }
}

async fn read_frame<S: FrameSource>(source: &mut S) -> Read {
    match source.next_frame().await {
        Some(Ok(frame)) => Read::Frame(frame),
        Some(Err(e)) => Read::Failed(e),
        None => Read::Ended,
    }
}

async fn idle_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticks: &mut Option<Interval>) {
    match ticks {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => std::future::pending().await,
    }
}
