//! murmur core - shared domain types for the chat relay
//!
//! This crate provides the domain types shared between the wire
//! protocol (`murmur-protocol`) and the daemon (`murmurd`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod connection;
pub mod error;
pub mod ids;
pub mod message;
pub mod user;

// Re-exports for convenience
pub use connection::ConnectionState;
pub use error::{DomainError, DomainResult};
pub use ids::{ConnectionId, UserId};
pub use message::ChatMessage;
pub use user::{NewUser, User, UserView};
