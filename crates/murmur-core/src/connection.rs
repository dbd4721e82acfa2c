//! Connection lifecycle state.

use crate::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a client connection.
///
/// ```text
/// Connecting ──▶ Open ──▶ Closing ──▶ Closed
///     │                                  ▲
///     └──────────────────────────────────┘  (auth rejected)
/// ```
///
/// A registry entry exists only while the connection is `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Transport accepted, not yet authenticated.
    #[default]
    Connecting,
    /// Authenticated and registered.
    Open,
    /// Cleanup in progress.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closed) | (Open, Closing) | (Closing, Closed)
        )
    }

    /// Returns the successor state, or an error if the move is illegal.
    pub fn transition(self, next: ConnectionState) -> DomainResult<ConnectionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Returns true for the terminal state.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let state = ConnectionState::default();
        let state = state.transition(ConnectionState::Open).unwrap();
        let state = state.transition(ConnectionState::Closing).unwrap();
        let state = state.transition(ConnectionState::Closed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_rejected_connection_skips_open() {
        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Closed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!ConnectionState::Open.can_transition_to(ConnectionState::Open));
        assert!(!ConnectionState::Closing.can_transition_to(ConnectionState::Open));
        assert!(!ConnectionState::Closed.can_transition_to(ConnectionState::Closing));
        assert!(ConnectionState::Closed
            .transition(ConnectionState::Open)
            .is_err());
    }
}
