//! Connection adapter — the framed byte-stream boundary of a session.
//!
//! DESIGN
//! ======
//! A connection is split into a read half (`FrameSource`) owned by the
//! inbound pump and a write half (`FrameSink`) owned by the outbound pump.
//! The hub and session never see axum types; the WebSocket implementations
//! below are the only place the transport leaks in, and tests substitute
//! in-memory halves.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),
}

/// Read half of a connection.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Block until the next application frame arrives.
    ///
    /// Returns `TransportError::Closed` once the peer has closed the stream.
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Write half of a connection.
#[async_trait::async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection. Errors are irrelevant at this point.
    async fn close(&mut self);
}

// =============================================================================
// WEBSOCKET
// =============================================================================

#[async_trait::async_trait]
impl FrameSource for SplitStream<WebSocket> {
    async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let Some(msg) = self.next().await else {
                return Err(TransportError::Closed);
            };
            match msg? {
                Message::Text(text) => return Ok(text.as_str().as_bytes().to_vec()),
                Message::Binary(bytes) => return Ok(bytes.to_vec()),
                Message::Close(_) => return Err(TransportError::Closed),
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}

#[async_trait::async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        SinkExt::send(self, Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = SinkExt::close(self).await;
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
