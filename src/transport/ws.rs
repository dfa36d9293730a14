//! WebSocket implementation of the channel transport

use super::{ChannelEvent, ChannelTransport, TransportError};
use crate::protocol::{self, OutboundMessage};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// One JSON message per text frame over a WebSocket
pub struct WsTransport {
    url: String,
    connected: Arc<AtomicBool>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connected: Arc::new(AtomicBool::new(false)),
            outbound: Mutex::new(None),
            cancel: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(&self, events: mpsc::Sender<ChannelEvent>) -> Result<(), TransportError> {
        let mut outbound = self.outbound.lock().await;
        if outbound.is_some() && self.is_connected() {
            return Err(TransportError::AlreadyConnected);
        }

        tracing::info!(url = %self.url, "Connecting to planning service");
        let (stream, _response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    url: self.url.clone(),
                    source: Box::new(e),
                })?;
        let (mut sink, mut source) = stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let cancel = CancellationToken::new();
        *outbound = Some(tx);
        *self.cancel.lock().await = Some(cancel.clone());
        drop(outbound);

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(url = %self.url, "Connected");
        let _ = events.send(ChannelEvent::Opened).await;

        // Writer: drains the outbound queue until closed locally
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_cancel.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                    next = rx.recv() => {
                        let Some(frame) = next else { break };
                        if let Err(e) = sink.send(frame).await {
                            tracing::warn!(error = %e, "Failed to write frame");
                            break;
                        }
                    }
                }
            }
        });

        // Reader: one decoded message per frame, in arrival order
        let connected = self.connected.clone();
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    () = cancel.cancelled() => break "closed locally".to_string(),
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if !forward(&text, &events).await {
                                break "event queue closed".to_string();
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                            Ok(text) => {
                                if !forward(text, &events).await {
                                    break "event queue closed".to_string();
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "Dropping non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            break frame.map_or_else(
                                || "closed by server".to_string(),
                                |f| format!("closed by server: {} {}", f.code, f.reason),
                            );
                        }
                        // Ping/pong are answered by tungstenite
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break e.to_string(),
                        None => break "connection ended".to_string(),
                    },
                }
            };

            // A local close already cleared the flag; only report remote loss
            if connected.swap(false, Ordering::SeqCst) {
                tracing::warn!(reason = %reason, "Connection lost");
                let _ = events.send(ChannelEvent::Closed { reason }).await;
            } else {
                tracing::debug!(reason = %reason, "Reader stopped");
            }
        });

        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) {
        if !self.is_connected() {
            tracing::warn!(kind = message.kind(), "Not connected, dropping outbound message");
            return;
        }
        let text = match protocol::encode(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(kind = message.kind(), error = %e, "Failed to encode outbound message");
                return;
            }
        };
        let outbound = self.outbound.lock().await;
        match outbound.as_ref() {
            Some(tx) if tx.send(Message::Text(text)).is_ok() => {
                tracing::debug!(kind = message.kind(), "Sent message");
            }
            _ => tracing::warn!(kind = message.kind(), "Writer gone, dropping outbound message"),
        }
    }

    async fn close(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        self.outbound.lock().await.take();
        if was_connected {
            tracing::info!(url = %self.url, "Connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Decode a frame and post it. Returns false once the receiver is gone.
async fn forward(text: &str, events: &mpsc::Sender<ChannelEvent>) -> bool {
    match protocol::decode(text) {
        Ok(Some(message)) => {
            tracing::debug!(kind = message.kind(), "Received message");
            events.send(ChannelEvent::Message(message)).await.is_ok()
        }
        Ok(None) => {
            tracing::debug!("Ignoring message of unknown type");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed frame");
            true
        }
    }
}
