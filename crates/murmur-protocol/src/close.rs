//! WebSocket close codes and reasons.

use std::fmt;

/// 1000: normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// 1001: endpoint going away (shutdown, idle timeout).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// 1008: policy violation (missing or invalid authentication).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// 1013: try again later (server at capacity).
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Why the server closed a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Neither a `token` query parameter nor a bearer header was sent.
    MissingToken,

    /// The token could not be decoded, has expired, or has a bad signature.
    InvalidToken,

    /// The token was valid but its user no longer exists.
    UserNotFound,

    /// A connection with the same identity is already registered.
    DuplicateConnection,

    /// The registry is at capacity.
    ServerFull,

    /// No frames were received within the idle timeout.
    IdleTimeout,

    /// The server is shutting down.
    ShuttingDown,
}

impl CloseReason {
    /// The close code sent in the close frame.
    pub fn code(self) -> u16 {
        match self {
            Self::MissingToken
            | Self::InvalidToken
            | Self::UserNotFound
            | Self::DuplicateConnection => CLOSE_POLICY_VIOLATION,
            Self::ServerFull => CLOSE_TRY_AGAIN_LATER,
            Self::IdleTimeout | Self::ShuttingDown => CLOSE_GOING_AWAY,
        }
    }

    /// Human-readable reason string sent in the close frame.
    pub fn reason(self) -> &'static str {
        match self {
            Self::MissingToken => "Missing Authentication Token",
            Self::InvalidToken => "Could not validate credentials",
            Self::UserNotFound => "User not found",
            Self::DuplicateConnection => "Connection already registered",
            Self::ServerFull => "Server is full",
            Self::IdleTimeout => "Idle timeout",
            Self::ShuttingDown => "Server shutting down",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}
