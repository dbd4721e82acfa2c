//! A single live client connection.
//!
//! A [`Connection`] is shared (via `Arc`) between the session that owns it
//! and the registry, which hands it to the broadcast engine. Writes go
//! through a per-connection async mutex so broadcast frames and the
//! session's own close frame never interleave, and every write is bounded
//! by a timeout.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Lock poisoning cannot occur: state lives in an atomic

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use murmur_core::{ConnectionId, ConnectionState, DomainError, DomainResult};
use murmur_protocol::CLOSE_NORMAL;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::auth::Principal;
use crate::transport::{FrameSink, TransportError};

/// One client link: identity, lifecycle state and the write half.
pub struct Connection {
    id: ConnectionId,

    /// Set once authentication succeeds
    principal: OnceLock<Principal>,

    /// `ConnectionState` encoded as u8
    state: AtomicU8,

    /// Write half, serialized across all writers
    sink: Mutex<Box<dyn FrameSink>>,

    /// Cancelled when a writer observes this connection failing
    failed: CancellationToken,
}

impl Connection {
    /// Creates a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, sink: Box<dyn FrameSink>) -> Self {
        Self {
            id,
            principal: OnceLock::new(),
            state: AtomicU8::new(encode(ConnectionState::Connecting)),
            sink: Mutex::new(sink),
            failed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The authenticated user, if any.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.get()
    }

    /// Label used in chat frames, or the connection id before auth.
    pub fn label(&self) -> String {
        match self.principal.get() {
            Some(principal) => principal.label.clone(),
            None => self.id.to_string(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Attaches the authenticated user.
    ///
    /// Only the first call has any effect.
    pub fn authenticate(&self, principal: Principal) -> bool {
        self.principal.set(principal).is_ok()
    }

    /// Atomically moves from `from` to `to`.
    ///
    /// Fails if the current state is not `from` or the move is illegal, so
    /// of several racing callers exactly one wins.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> DomainResult<()> {
        from.transition(to)?;
        self.state
            .compare_exchange(encode(from), encode(to), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| DomainError::InvalidTransition {
                from: decode(actual),
                to,
            })
    }

    /// Sends a text frame, waiting at most `limit` (including time spent
    /// queued behind other writers).
    pub async fn send_text(&self, text: &str, limit: Duration) -> Result<(), SendError> {
        if self.state() == ConnectionState::Closed {
            return Err(SendError::Closed);
        }

        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send_text(text.to_owned()).await
        };

        match timeout(limit, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SendError::Transport(e)),
            Err(_) => Err(SendError::Timeout(limit)),
        }
    }

    /// Sends a keepalive ping, bounded like [`send_text`](Self::send_text).
    pub async fn send_ping(&self, limit: Duration) -> Result<(), SendError> {
        if self.state() == ConnectionState::Closed {
            return Err(SendError::Closed);
        }

        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send_ping().await
        };

        match timeout(limit, write).await {
            Ok(result) => result.map_err(SendError::Transport),
            Err(_) => Err(SendError::Timeout(limit)),
        }
    }

    /// Sends a close frame. Errors are ignored; the peer may be gone.
    pub async fn close(&self, code: Option<u16>, reason: &str, limit: Duration) {
        let code = code.unwrap_or(CLOSE_NORMAL);
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.close_with(code, reason).await
        };
        let _ = timeout(limit, write).await;
    }

    /// Tells the owning session that this connection is broken.
    pub fn signal_failure(&self) {
        self.failed.cancel();
    }

    pub fn is_failed(&self) -> bool {
        self.failed.is_cancelled()
    }

    /// Resolves once [`signal_failure`](Self::signal_failure) has been called.
    pub fn failure(&self) -> WaitForCancellationFuture<'_> {
        self.failed.cancelled()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("principal", &self.principal.get())
            .field("state", &self.state())
            .field("failed", &self.is_failed())
            .finish_non_exhaustive()
    }
}

fn encode(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Connecting => 0,
        ConnectionState::Open => 1,
        ConnectionState::Closing => 2,
        ConnectionState::Closed => 3,
    }
}

fn decode(raw: u8) -> ConnectionState {
    match raw {
        0 => ConnectionState::Connecting,
        1 => ConnectionState::Open,
        2 => ConnectionState::Closing,
        _ => ConnectionState::Closed,
    }
}

/// Errors from a single send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
