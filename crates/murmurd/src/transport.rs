//! Transport seam between sessions and the wire.
//!
//! Sessions and the broadcast engine only see [`FrameSink`] and
//! [`FrameSource`]. The axum WebSocket halves implement them for the real
//! server; [`channel`] provides an in-process implementation backed by
//! tokio channels.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Sends an empty keepalive ping.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Sends a close frame and shuts the write half.
    async fn close_with(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound frame, or `None` once the peer is gone.
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>>;
}

/// An inbound frame, reduced to what a session cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong; pings are answered by the transport itself
    Control,
    Close,
}

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport I/O error: {0}")]
    Io(String),
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// ============================================================================
// axum WebSocket
// ============================================================================

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.send(Message::Ping(Default::default())).await?;
        Ok(())
    }

    async fn close_with(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        self.send(Message::Close(Some(frame))).await?;
        SinkExt::close(self).await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSource for SplitStream<WebSocket> {
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>> {
        let msg = self.next().await?;
        Some(msg.map(Inbound::from).map_err(TransportError::from))
    }
}

impl From<Message> for Inbound {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
            Message::Binary(data) => Inbound::Binary(data.to_vec()),
            Message::Ping(_) | Message::Pong(_) => Inbound::Control,
            Message::Close(_) => Inbound::Close,
        }
    }
}

// ============================================================================
// In-process channel transport
// ============================================================================

/// Channel-backed transport for embedding sessions without a socket.
pub mod channel {
    use std::future;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{FrameSink, FrameSource, Inbound, TransportError};

    /// Something a [`ChannelSink`] emitted.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SinkEvent {
        Text(String),
        Ping,
        Close { code: u16, reason: String },
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Deliver,
        Fail,
        Stall,
    }

    /// Write half that forwards frames into an unbounded channel.
    #[derive(Debug)]
    pub struct ChannelSink {
        tx: mpsc::UnboundedSender<SinkEvent>,
        mode: Mode,
    }

    impl ChannelSink {
        /// A sink that delivers every frame.
        pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
            Self::with_mode(Mode::Deliver)
        }

        /// A sink whose text sends always fail.
        pub fn failing() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
            Self::with_mode(Mode::Fail)
        }

        /// A sink whose text sends never complete.
        pub fn stalled() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
            Self::with_mode(Mode::Stall)
        }

        fn with_mode(mode: Mode) -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { tx, mode }, rx)
        }
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            match self.mode {
                Mode::Deliver => self
                    .tx
                    .send(SinkEvent::Text(text))
                    .map_err(|_| TransportError::Closed),
                Mode::Fail => Err(TransportError::Io("broken pipe".to_string())),
                Mode::Stall => future::pending().await,
            }
        }

        async fn send_ping(&mut self) -> Result<(), TransportError> {
            match self.mode {
                Mode::Deliver => self.tx.send(SinkEvent::Ping).map_err(|_| TransportError::Closed),
                Mode::Fail => Err(TransportError::Io("broken pipe".to_string())),
                Mode::Stall => future::pending().await,
            }
        }

        async fn close_with(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
            self.tx
                .send(SinkEvent::Close {
                    code,
                    reason: reason.to_string(),
                })
                .map_err(|_| TransportError::Closed)
        }
    }

    /// Read half fed from an unbounded channel.
    ///
    /// Dropping the paired sender ends the stream.
    #[derive(Debug)]
    pub struct ChannelSource {
        rx: mpsc::UnboundedReceiver<Result<Inbound, TransportError>>,
    }

    impl ChannelSource {
        pub fn new() -> (mpsc::UnboundedSender<Result<Inbound, TransportError>>, Self) {
            let (tx, rx) = mpsc::unbounded_channel();
            (tx, Self { rx })
        }
    }

    #[async_trait]
    impl FrameSource for ChannelSource {
        async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>> {
            self.rx.recv().await
        }
    }
}
