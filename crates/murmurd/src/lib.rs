//! murmur daemon - connection registry, broadcast fanout and chat server
//!
//! This crate provides the core infrastructure for the chat relay:
//! - `registry` - Connection registry actor, the source of truth for membership
//! - `broadcast` - Snapshot-based fanout with per-send timeouts
//! - `session` - Per-connection state machine from handshake to close
//! - `auth` - Token issuance/verification, password hashing, user directory
//! - `server` - HTTP endpoints and WebSocket upgrade (axum)
//! - `config` - TOML/env configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       murmurd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│     RegistryActor           │   │
//! │  │ (HTTP + /ws)    │     │  (membership owner)         │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ upgrades                    │ snapshots         │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionSession│────▶│     BroadcastEngine         │   │
//! │  │  (per client)   │     │  (fanout to connections)    │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows a panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
