//! Minimal frame-level view of a `WebSocket` connection.
//!
//! The streaming loops only need to send text and ping frames, read the next
//! inbound frame, and close. Deadlines are applied by the loops themselves
//! with `tokio::time::timeout`.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::errors::TransportError;

/// A frame received from the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text data frame.
    Text(String),
    /// Binary data frame.
    Binary(Bytes),
    /// Ping control frame.
    Ping,
    /// Pong control frame (liveness acknowledgement).
    Pong,
    /// Close control frame.
    Close,
}

impl From<Message> for InboundFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text.to_string()),
            Message::Binary(data) => Self::Binary(data),
            Message::Ping(_) => Self::Ping,
            Message::Pong(_) => Self::Pong,
            Message::Close(_) => Self::Close,
        }
    }
}

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    /// Send an empty ping frame.
    async fn send_ping(&mut self) -> Result<(), TransportError>;
    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next frame. `None` means the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.send(Message::Ping(Bytes::new())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self).await?;
        Ok(())
    }
}

#[async_trait]
impl FrameStream for SplitStream<WebSocket> {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.next()
            .await
            .map(|r| r.map(InboundFrame::from).map_err(TransportError::from))
    }
}
