//! Outbound text frames.
//!
//! Frames are plain text rather than JSON, matching what existing chat
//! clients display verbatim:
//!
//! ```text
//! alice says: hello
//! bob has joined the chat
//! bob has left the chat
//! ```

use std::fmt;

use murmur_core::ChatMessage;
use thiserror::Error;

const SAYS: &str = " says: ";
const JOINED: &str = " has joined the chat";
const LEFT: &str = " has left the chat";

/// A frame sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A relayed chat message
    Chat { label: String, text: String },

    /// A user became active
    Joined { label: String },

    /// A user's connection closed
    Left { label: String },
}

impl OutboundFrame {
    /// Creates a chat frame.
    pub fn chat(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Chat {
            label: label.into(),
            text: text.into(),
        }
    }

    /// Creates a join notification.
    pub fn joined(label: impl Into<String>) -> Self {
        Self::Joined {
            label: label.into(),
        }
    }

    /// Creates a departure notification.
    pub fn left(label: impl Into<String>) -> Self {
        Self::Left {
            label: label.into(),
        }
    }

    /// Label of the user the frame is attributed to.
    pub fn label(&self) -> &str {
        match self {
            Self::Chat { label, .. } | Self::Joined { label } | Self::Left { label } => label,
        }
    }

    /// Renders the frame to its wire text.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Parses wire text back into a frame.
    ///
    /// Chat frames split on the first `" says: "`, so labels cannot
    /// contain that sequence but message text can.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        if let Some((label, body)) = text.split_once(SAYS) {
            return Ok(Self::chat(check_label(label, text)?, body));
        }
        if let Some(label) = text.strip_suffix(JOINED) {
            return Ok(Self::joined(check_label(label, text)?));
        }
        if let Some(label) = text.strip_suffix(LEFT) {
            return Ok(Self::left(check_label(label, text)?));
        }
        Err(FrameError::Unrecognized(text.to_string()))
    }
}

fn check_label<'a>(label: &'a str, frame: &str) -> Result<&'a str, FrameError> {
    if label.is_empty() {
        Err(FrameError::MissingLabel(frame.to_string()))
    } else {
        Ok(label)
    }
}

impl From<&ChatMessage> for OutboundFrame {
    fn from(msg: &ChatMessage) -> Self {
        Self::chat(msg.label.clone(), msg.text.clone())
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat { label, text } => write!(f, "{label}{SAYS}{text}"),
            Self::Joined { label } => write!(f, "{label}{JOINED}"),
            Self::Left { label } => write!(f, "{label}{LEFT}"),
        }
    }
}

/// Errors that can occur when parsing frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Unrecognized frame: {0}")]
    Unrecognized(String),

    #[error("Frame has no label: {0}")]
    MissingLabel(String),
}
