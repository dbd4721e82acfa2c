//! HTTP and WebSocket server for the murmur daemon.
//!
//! The server:
//! - Serves the account endpoints (`/register`, `/login`)
//! - Upgrades `/ws` and `/ws/{client_id}` requests and runs a
//!   ConnectionSession per client
//! - Logs registry membership changes
//! - Supports graceful shutdown via CancellationToken, then waits for live
//!   sessions to send their close frames and departures
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │  (axum Router)  │
//! └───────┬─────────┘
//!         │ GET /ws (upgrade)
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionSession│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └────────┬────────┘
//!         │ relay                  │ snapshot
//!         ▼                        ▼
//! ┌─────────────────────────────────────────┐
//! │             BroadcastEngine             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-connection failures are logged and never stop the server

mod routes;

use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::auth::{AccountService, Authenticator, InMemoryUserDirectory, TokenService};
use crate::broadcast::BroadcastEngine;
use crate::config::{Config, ConfigError};
use crate::registry::{spawn_registry, RegistryEvent, RegistryHandle};
use crate::session::SessionContext;

/// State shared by all request handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) accounts: AccountService,
    pub(crate) sessions: SessionContext,

    /// Source of server-assigned connection ids; first id is 1
    pub(crate) connection_counter: Arc<AtomicU64>,

    /// Every upgraded socket's session task
    pub(crate) tasks: TaskTracker,
}

/// The chat relay server.
pub struct ChatServer {
    listen: SocketAddr,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ChatServer {
    /// Builds the server and spawns its registry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(mut config: Config, cancel_token: CancellationToken) -> Result<Self, ServerError> {
        config.validate()?;
        let secret = config.ensure_secret().as_bytes().to_vec();

        let registry = spawn_registry(config.server.max_connections);
        let tokens = TokenService::new(&secret, config.token_ttl());
        let directory = Arc::new(InMemoryUserDirectory::new());

        let accounts = AccountService::new(directory.clone(), tokens.clone(), config.auth.bcrypt_cost);
        let broadcaster = BroadcastEngine::new(registry.clone(), config.send_timeout())
            .with_echo_to_sender(config.server.echo_to_sender);

        let sessions = SessionContext {
            registry,
            broadcaster,
            authenticator: Arc::new(Authenticator::new(tokens, directory)),
            settings: config.session_settings(),
            shutdown: cancel_token.clone(),
        };

        Ok(Self {
            listen: config.server.listen,
            state: AppState {
                accounts,
                sessions,
                connection_counter: Arc::new(AtomicU64::new(1)),
                tasks: TaskTracker::new(),
            },
            cancel_token,
        })
    }

    /// The axum router serving every endpoint.
    pub fn router(&self) -> Router {
        routes::build_router(self.state.clone())
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.state.sessions.registry
    }

    pub fn accounts(&self) -> &AccountService {
        &self.state.accounts
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.listen)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.listen,
                error: e.to_string(),
            })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Serve(e.to_string()))?;
        info!(addr = %addr, "Chat server listening");

        self.spawn_event_logger();

        let cancel = self.cancel_token.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        self.drain_sessions().await;
        info!("Chat server stopped");
        Ok(())
    }

    /// Number of session tasks still running.
    pub fn active_sessions(&self) -> usize {
        self.state.tasks.len()
    }

    /// Waits for session tasks to finish their cleanup.
    ///
    /// A session may be mid-broadcast, then announces its departure and
    /// sends its close frame, each bounded by the send timeout.
    async fn drain_sessions(&self) {
        let tasks = &self.state.tasks;
        tasks.close();
        if tasks.is_empty() {
            return;
        }

        let limit = self.drain_timeout();
        debug!(sessions = tasks.len(), "Waiting for sessions to close");
        if tokio::time::timeout(limit, tasks.wait()).await.is_err() {
            warn!(
                sessions = tasks.len(),
                timeout_ms = limit.as_millis() as u64,
                "Sessions still running after shutdown timeout"
            );
        }
    }

    fn drain_timeout(&self) -> Duration {
        self.state.sessions.broadcaster.send_timeout() * 3
    }

    /// Logs registry membership changes until shutdown.
    fn spawn_event_logger(&self) {
        let mut event_rx = self.registry().subscribe();
        let registry = self.registry().clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event logger shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(RegistryEvent::Added { id, user }) => {
                                let online = registry.len().await;
                                debug!(connection = %id, user_id = %user, online, "Connection added");
                            }
                            Ok(RegistryEvent::Removed { id }) => {
                                let online = registry.len().await;
                                debug!(connection = %id, online, "Connection removed");
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event logger lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("server error: {0}")]
    Serve(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
