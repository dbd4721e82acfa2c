//! Chat message value type.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single inbound chat message.
///
/// Ephemeral: lives only for the duration of one fanout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent it
    pub sender: UserId,

    /// Display label of the sender (their username)
    pub label: String,

    /// Raw text as received
    pub text: String,

    /// When the server received the frame
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    pub fn new(sender: UserId, label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_timestamp(sender, label, text, Utc::now())
    }

    /// Creates a message with an explicit arrival time.
    pub fn with_timestamp(
        sender: UserId,
        label: impl Into<String>,
        text: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sender,
            label: label.into(),
            text: text.into(),
            received_at,
        }
    }

    /// Returns true if the text has no visible content.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
