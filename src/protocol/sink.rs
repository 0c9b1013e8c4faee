use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::ServerMessage;

/// Outbound half of a client connection
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver a message; fails once the transport is gone
    async fn send(&self, message: ServerMessage) -> Result<()>;
}

/// Best-effort delivery. Returns whether the message was handed to the transport.
pub async fn notify(sink: &dyn EventSink, message: ServerMessage) -> bool {
    match sink.send(message).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Dropping outbound message: {:#}", e);
            false
        }
    }
}

/// Sink backed by a channel that a writer task drains into the socket
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ServerMessage>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait::async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, message: ServerMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow!("connection closed"))
    }
}
