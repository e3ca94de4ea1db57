//! Multi-client synchronization of one logical task document.
//!
//! Each session mirrors the full collection to every peer subscribed to the
//! same room topic and reconciles inbound snapshots last-writer-wins, at
//! whole-document granularity. Loop suppression is by sender id: a session
//! discards messages carrying its own id, and applying a remote snapshot
//! never triggers a re-broadcast.

mod envelope;
mod memory;
mod transport;

pub use envelope::Envelope;
pub use memory::MemoryBroker;
pub use transport::{Transport, TransportSession};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use taskdeck_core::Task;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("broker handshake timed out")]
    HandshakeTimeout,

    #[error("transport disconnected")]
    Disconnected,

    #[error("publish failed: {0}")]
    Publish(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Connecting,
    Connected,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Connecting => "connecting",
            SyncStatus::Connected => "connected",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of feeding an inbound payload to the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A peer's snapshot to apply wholesale. Applying it must not be
    /// re-broadcast, or every client would broadcast forever in response to
    /// every other client's broadcast.
    Apply(Vec<Task>),
    /// Our own broadcast coming back around, or a payload we could not
    /// decode. Either way: no observable state change.
    Discard,
}

pub struct Synchronizer {
    session_id: String,
    transport: Arc<dyn Transport>,
    handshake_timeout: Duration,
    status: SyncStatus,
    session: Option<TransportSession>,
    room: Option<String>,
}

impl Synchronizer {
    pub fn new(transport: Arc<dyn Transport>, handshake_timeout: Duration) -> Self {
        Self {
            // Per-session identity, generated once; this is what echo
            // suppression keys on.
            session_id: uuid::Uuid::new_v4().to_string(),
            transport,
            handshake_timeout,
            status: SyncStatus::Idle,
            session: None,
            room: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == SyncStatus::Connected
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Join a room: handshake (bounded by the handshake timeout), then
    /// immediately publish the local collection so late joiners converge.
    /// Any prior session is torn down first, so a rejoin never produces
    /// duplicate delivery.
    pub async fn join(&mut self, room: &str, tasks: &[Task]) -> SyncStatus {
        self.leave();
        self.status = SyncStatus::Connecting;

        let connected =
            tokio::time::timeout(self.handshake_timeout, self.transport.connect(room)).await;
        match connected {
            Ok(Ok(session)) => {
                self.session = Some(session);
                self.room = Some(room.to_string());
                self.status = SyncStatus::Connected;
                info!("joined room {room} as {}", self.session_id);
                self.broadcast(tasks).await;
            }
            Ok(Err(e)) => {
                warn!("joining room {room} failed: {e}");
                self.status = SyncStatus::Error;
            }
            Err(_) => {
                warn!("joining room {room} failed: {}", SyncError::HandshakeTimeout);
                self.status = SyncStatus::Error;
            }
        }
        self.status
    }

    /// Tear down the current session, returning to idle.
    pub fn leave(&mut self) {
        if self.session.take().is_some() {
            info!("left room {}", self.room.as_deref().unwrap_or("?"));
        }
        self.room = None;
        self.status = SyncStatus::Idle;
    }

    /// Publish the full collection. A transport failure tears the session
    /// down and surfaces as the error status; the caller may rejoin.
    pub async fn broadcast(&mut self, tasks: &[Task]) {
        let Some(session) = &self.session else {
            return;
        };
        let envelope = Envelope::new(self.session_id.clone(), tasks.to_vec());
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to encode sync envelope: {e}");
                return;
            }
        };
        if let Err(e) = session.publish(Bytes::from(payload)).await {
            warn!("broadcast failed: {e}");
            self.session = None;
            self.room = None;
            self.status = SyncStatus::Error;
        }
    }

    /// Next raw inbound payload. `None` means the transport closed the
    /// subscription; callers should then invoke [`Self::handle_disconnect`].
    /// Must only be polled while connected.
    pub async fn recv(&mut self) -> Option<Bytes> {
        match &mut self.session {
            Some(session) => session.recv().await,
            None => None,
        }
    }

    /// An orderly transport close is not an error; return to idle.
    pub fn handle_disconnect(&mut self) {
        debug!("transport closed subscription for room {:?}", self.room);
        self.leave();
    }

    /// Classify an inbound payload: our own echo and malformed payloads are
    /// discarded with a diagnostic, everything else is a snapshot to apply.
    pub fn classify(&self, payload: &[u8]) -> Inbound {
        match Envelope::decode(payload) {
            Ok(envelope) if envelope.sender == self.session_id => {
                debug!("suppressed echo of our own broadcast");
                Inbound::Discard
            }
            Ok(envelope) => {
                debug!(
                    "applying snapshot of {} tasks from {}",
                    envelope.tasks.len(),
                    envelope.sender
                );
                Inbound::Apply(envelope.tasks)
            }
            Err(e) => {
                warn!("discarding malformed sync payload: {e}");
                Inbound::Discard
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use taskdeck_core::TaskDraft;
    use tokio::sync::mpsc;

    fn sample_tasks() -> Vec<Task> {
        vec![Task::from_draft(
            TaskDraft {
                title: "shared".into(),
                description: String::new(),
                priority: Default::default(),
                category: Default::default(),
                start_at: None,
                reminder_interval: Default::default(),
                attachments: Vec::new(),
            },
            Utc::now(),
        )]
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn connect(&self, _room: &str) -> Result<TransportSession, SyncError> {
            Err(SyncError::Connect("broker unreachable".into()))
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn connect(&self, _room: &str) -> Result<TransportSession, SyncError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn join_publishes_snapshot_and_connects() {
        let broker = Arc::new(MemoryBroker::new());
        let mut peer = broker.connect("room").await.unwrap();

        let mut sync = Synchronizer::new(broker.clone(), Duration::from_secs(1));
        assert_eq!(sync.status(), SyncStatus::Idle);

        let tasks = sample_tasks();
        let status = sync.join("room", &tasks).await;
        assert_eq!(status, SyncStatus::Connected);
        assert_eq!(sync.room(), Some("room"));

        let payload = peer.recv().await.unwrap();
        let envelope = Envelope::decode(&payload).unwrap();
        assert_eq!(envelope.sender, sync.session_id());
        assert_eq!(envelope.tasks[0].id, tasks[0].id);
    }

    #[tokio::test]
    async fn join_failure_sets_error_status() {
        let mut sync = Synchronizer::new(Arc::new(FailingTransport), Duration::from_secs(1));
        let status = sync.join("room", &[]).await;
        assert_eq!(status, SyncStatus::Error);
        assert!(!sync.is_connected());
        assert_eq!(sync.room(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_is_a_transport_error() {
        let mut sync = Synchronizer::new(Arc::new(HangingTransport), Duration::from_secs(10));
        let status = sync.join("room", &[]).await;
        assert_eq!(status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn own_echo_is_discarded() {
        let broker = Arc::new(MemoryBroker::new());
        let mut sync = Synchronizer::new(broker, Duration::from_secs(1));
        let tasks = sample_tasks();
        sync.join("room", &tasks).await;

        // The broker loops our join broadcast straight back to us.
        let payload = sync.recv().await.unwrap();
        assert_eq!(sync.classify(&payload), Inbound::Discard);
    }

    #[tokio::test]
    async fn peer_snapshot_is_applied() {
        let broker = Arc::new(MemoryBroker::new());
        let mut sync = Synchronizer::new(broker, Duration::from_secs(1));
        sync.join("room", &[]).await;

        let tasks = sample_tasks();
        let foreign = Envelope::new("someone-else", tasks.clone());
        match sync.classify(&foreign.encode().unwrap()) {
            Inbound::Apply(applied) => assert_eq!(applied[0].id, tasks[0].id),
            Inbound::Discard => panic!("peer snapshot must be applied"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_discarded() {
        let broker = Arc::new(MemoryBroker::new());
        let mut sync = Synchronizer::new(broker, Duration::from_secs(1));
        sync.join("room", &[]).await;
        assert_eq!(sync.classify(b"][ junk"), Inbound::Discard);
    }

    #[tokio::test]
    async fn leave_returns_to_idle_and_rejoin_works() {
        let broker = Arc::new(MemoryBroker::new());
        let mut sync = Synchronizer::new(broker, Duration::from_secs(1));
        sync.join("room", &[]).await;
        assert!(sync.is_connected());

        sync.leave();
        assert_eq!(sync.status(), SyncStatus::Idle);
        assert_eq!(sync.room(), None);

        let status = sync.join("other-room", &[]).await;
        assert_eq!(status, SyncStatus::Connected);
        assert_eq!(sync.room(), Some("other-room"));
    }

    #[tokio::test]
    async fn broadcast_failure_tears_down_session() {
        // A session whose outbound channel is closed behaves like a dead
        // transport: publishing fails.
        let (out_tx, out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        drop(out_rx);

        let broker = Arc::new(MemoryBroker::new());
        let mut sync = Synchronizer::new(broker, Duration::from_secs(1));
        sync.session = Some(TransportSession::new(out_tx, in_rx));
        sync.room = Some("room".into());
        sync.status = SyncStatus::Connected;

        sync.broadcast(&sample_tasks()).await;
        assert_eq!(sync.status(), SyncStatus::Error);
        assert_eq!(sync.room(), None);
    }
}
