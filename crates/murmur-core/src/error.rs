//! Domain-specific error types following panic-free policy.

use crate::ConnectionState;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A connection was asked to move to a state it cannot reach
    #[error("Invalid connection transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl DomainError {
    /// Creates an invalid field error.
    pub fn invalid_field(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_display() {
        let err = DomainError::InvalidTransition {
            from: ConnectionState::Closed,
            to: ConnectionState::Open,
        };
        assert_eq!(err.to_string(), "Invalid connection transition: closed -> open");
    }

    #[test]
    fn test_invalid_field_display() {
        let err = DomainError::invalid_field("email", "nope", "an address containing '@'");
        assert_eq!(
            err.to_string(),
            "Invalid email: nope (expected an address containing '@')"
        );
    }
}
