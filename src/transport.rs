//! Channel transport
//!
//! One bidirectional connection to the planning service. Frames are decoded
//! at this boundary: the session only ever sees well-formed
//! [`InboundMessage`]s, delivered in arrival order on a single queue.

mod ws;

pub use ws::WsTransport;

use crate::protocol::{InboundMessage, OutboundMessage};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Connection lifecycle and decoded frames, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Message(InboundMessage),
    Closed { reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("already connected")]
    AlreadyConnected,
}

/// Bidirectional message channel to the planning service
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open the connection. Lifecycle events and decoded frames are posted
    /// to `events` until the connection ends.
    async fn connect(&self, events: mpsc::Sender<ChannelEvent>) -> Result<(), TransportError>;

    /// Queue a message. Dropped with a logged warning when not connected.
    async fn send(&self, message: &OutboundMessage);

    /// Close the connection. Safe to call more than once.
    async fn close(&self);

    fn is_connected(&self) -> bool;
}

#[async_trait]
impl<T: ChannelTransport + ?Sized> ChannelTransport for Arc<T> {
    async fn connect(&self, events: mpsc::Sender<ChannelEvent>) -> Result<(), TransportError> {
        (**self).connect(events).await
    }

    async fn send(&self, message: &OutboundMessage) {
        (**self).send(message).await;
    }

    async fn close(&self) {
        (**self).close().await;
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
