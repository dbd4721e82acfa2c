//! murmur protocol - wire formats for the chat relay
//!
//! This crate provides the text frames exchanged over WebSocket
//! connections, the close codes used to reject or end a connection,
//! bearer-token extraction for the handshake, and the JSON/form bodies
//! of the HTTP login flow.

pub mod api;
pub mod close;
pub mod frame;
pub mod handshake;

pub use api::{ErrorResponse, LoginForm, MessageResponse, RegisterRequest, TokenResponse};
pub use close::{CloseReason, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, CLOSE_TRY_AGAIN_LATER};
pub use frame::{FrameError, OutboundFrame};
pub use handshake::{extract_bearer_token, TokenExtractError, BEARER_PREFIX, TOKEN_QUERY_PARAM};
