use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::transport::{Transport, TransportSession};
use crate::SyncError;

/// In-process broker: one broadcast topic per room. Every subscriber,
/// including the publisher itself, receives every message, which makes this
/// the reference transport for exercising echo suppression in tests and for
/// multiple engines sharing a process.
pub struct MemoryBroker {
    rooms: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn topic(&self, room: &str) -> broadcast::Sender<Bytes> {
        let mut rooms = self.rooms.lock().expect("broker lock poisoned");
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn connect(&self, room: &str) -> Result<TransportSession, SyncError> {
        let topic = self.topic(room);
        let mut topic_rx = topic.subscribe();

        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(16);
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(16);

        // Outbound pump: session -> topic. Ends when the session drops.
        tokio::spawn(async move {
            while let Some(payload) = out_rx.recv().await {
                // No subscribers is fine; the room may be empty.
                let _ = topic.send(payload);
            }
        });

        // Inbound pump: topic -> session. A lagged receiver skips ahead,
        // matching the at-most-once transport contract.
        tokio::spawn(async move {
            loop {
                match topic_rx.recv().await {
                    Ok(payload) => {
                        if in_tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("memory broker dropped {skipped} messages for a slow session");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(TransportSession::new(out_tx, in_rx))
    }
}
