use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::SyncError;

/// A pub/sub transport scoped to one room topic.
///
/// `connect` covers the whole broker handshake: by the time it returns, the
/// session is subscribed and publishable. Implementations must not assume the
/// caller bounds the handshake; the synchronizer wraps it in a timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, room: &str) -> Result<TransportSession, SyncError>;
}

/// A live subscription. Dropping the session unsubscribes; there is no
/// half-open state to manage.
pub struct TransportSession {
    outbound: mpsc::Sender<Bytes>,
    inbound: mpsc::Receiver<Bytes>,
}

impl TransportSession {
    pub fn new(outbound: mpsc::Sender<Bytes>, inbound: mpsc::Receiver<Bytes>) -> Self {
        Self { outbound, inbound }
    }

    /// Publish to the room topic. At-most-once: delivery is not acknowledged.
    pub async fn publish(&self, payload: Bytes) -> Result<(), SyncError> {
        self.outbound
            .send(payload)
            .await
            .map_err(|_| SyncError::Disconnected)
    }

    /// Next inbound message. `None` means the transport closed the
    /// subscription (orderly disconnect, not an error).
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }
}
