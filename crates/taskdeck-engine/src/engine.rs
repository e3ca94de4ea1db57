use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskdeck_core::{
    AttachmentRenewal, CollectionStats, DispatchLog, Status, Task, TaskDraft, TaskFilter, TaskPatch,
};
use taskdeck_store::StateStore;
use taskdeck_sync::{Inbound, SyncStatus, Synchronizer, Transport};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::repository::{RepositoryError, TaskRepository};
use crate::scheduler::{DueReminder, ReminderScheduler, RemindPolicy};

/// Time source for the reminder poll. Injectable so tests can steer the
/// clock instead of sleeping through real intervals.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine stopped")]
    Stopped,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Events for external consumers (a UI layer, the headless logger, tests).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The collection changed; consumers should re-read what they display.
    CollectionChanged,
    /// A reminder was selected for presentation. It stays presented until
    /// dismissed; no second reminder is surfaced in between.
    ReminderDue(DueReminder),
    SyncStatusChanged(SyncStatus),
}

#[derive(Clone)]
pub struct EngineConfig {
    /// Reminder poll cadence.
    pub poll_interval: Duration,
    pub remind_policy: RemindPolicy,
    /// Bound on the broker handshake when joining a room.
    pub handshake_timeout: Duration,
    pub clock: Clock,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            remind_policy: RemindPolicy::default(),
            handshake_timeout: Duration::from_secs(10),
            clock: Arc::new(Utc::now),
        }
    }
}

enum Command {
    Add(TaskDraft),
    Update(String, Box<TaskPatch>),
    Delete(String),
    ChangeStatus {
        id: String,
        status: Status,
        notes: Option<String>,
    },
    ToggleReminder(String),
    ToggleAttachmentReminder {
        task_id: String,
        attachment_id: String,
    },
    RenewAttachment {
        task_id: String,
        attachment_id: String,
        renewal: AttachmentRenewal,
    },
    Reorder {
        from: usize,
        to: usize,
        reply: oneshot::Sender<Result<(), RepositoryError>>,
    },
    DismissReminder,
    Join(String),
    Leave,
    Tasks(oneshot::Sender<Vec<Task>>),
    Filtered(TaskFilter, oneshot::Sender<Vec<Task>>),
    Stats(oneshot::Sender<CollectionStats>),
    PendingReminder(oneshot::Sender<Option<DueReminder>>),
    SyncStatus(oneshot::Sender<SyncStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable client for the engine actor. All operations are messages onto
/// the engine's single command queue, so callers from any task share one
/// totally-ordered view.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Stopped)
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    pub async fn add_task(&self, draft: TaskDraft) -> Result<(), EngineError> {
        self.send(Command::Add(draft)).await
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<(), EngineError> {
        self.send(Command::Update(id.to_string(), Box::new(patch)))
            .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), EngineError> {
        self.send(Command::Delete(id.to_string())).await
    }

    pub async fn change_status(
        &self,
        id: &str,
        status: Status,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        self.send(Command::ChangeStatus {
            id: id.to_string(),
            status,
            notes,
        })
        .await
    }

    pub async fn toggle_reminder(&self, id: &str) -> Result<(), EngineError> {
        self.send(Command::ToggleReminder(id.to_string())).await
    }

    pub async fn toggle_attachment_reminder(
        &self,
        task_id: &str,
        attachment_id: &str,
    ) -> Result<(), EngineError> {
        self.send(Command::ToggleAttachmentReminder {
            task_id: task_id.to_string(),
            attachment_id: attachment_id.to_string(),
        })
        .await
    }

    pub async fn renew_attachment(
        &self,
        task_id: &str,
        attachment_id: &str,
        renewal: AttachmentRenewal,
    ) -> Result<(), EngineError> {
        self.send(Command::RenewAttachment {
            task_id: task_id.to_string(),
            attachment_id: attachment_id.to_string(),
            renewal,
        })
        .await
    }

    pub async fn reorder(&self, from: usize, to: usize) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Reorder {
            from,
            to,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| EngineError::Stopped)??;
        Ok(())
    }

    pub async fn dismiss_reminder(&self) -> Result<(), EngineError> {
        self.send(Command::DismissReminder).await
    }

    pub async fn join_room(&self, room: &str) -> Result<(), EngineError> {
        self.send(Command::Join(room.to_string())).await
    }

    pub async fn leave_room(&self) -> Result<(), EngineError> {
        self.send(Command::Leave).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>, EngineError> {
        self.query(Command::Tasks).await
    }

    pub async fn filtered_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, EngineError> {
        self.query(|tx| Command::Filtered(filter, tx)).await
    }

    pub async fn stats(&self) -> Result<CollectionStats, EngineError> {
        self.query(Command::Stats).await
    }

    pub async fn pending_reminder(&self) -> Result<Option<DueReminder>, EngineError> {
        self.query(Command::PendingReminder).await
    }

    pub async fn sync_status(&self) -> Result<SyncStatus, EngineError> {
        self.query(Command::SyncStatus).await
    }

    /// Stop the engine. Resolves once the final persist has completed, so a
    /// successor engine over the same store sees everything.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.query(Command::Shutdown).await
    }
}

/// The single-writer actor. UI commands, the reminder poll, and inbound
/// network messages are all consumed by one `select!` loop, so every
/// mutation of the collection is totally ordered and no locking exists
/// anywhere. Applying a remote snapshot happens on a code path that simply
/// never broadcasts, which is what keeps two clients from echoing each
/// other's updates forever.
pub struct Engine {
    repo: TaskRepository,
    scheduler: ReminderScheduler,
    sync: Synchronizer,
    store: Arc<dyn StateStore>,
    persist_tx: watch::Sender<Option<(Vec<Task>, DispatchLog)>>,
    writer: tokio::task::JoinHandle<()>,
    events: broadcast::Sender<EngineEvent>,
    clock: Clock,
    announced_sync_status: SyncStatus,
}

impl Engine {
    /// Load persisted state and start the actor. The handle is the only way
    /// to reach it.
    pub async fn spawn(
        store: Arc<dyn StateStore>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> EngineHandle {
        let tasks = store.load_tasks().await;
        let log = store.load_dispatch_log().await;
        info!(
            "engine starting with {} tasks, {} bookkeeping entries",
            tasks.len(),
            log.tasks.len() + log.attachments.len()
        );

        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, _) = broadcast::channel(64);

        // Writer task: always persists the latest snapshot, coalescing
        // bursts, so a slow save can never clobber a newer one.
        let (persist_tx, mut persist_rx) =
            watch::channel::<Option<(Vec<Task>, DispatchLog)>>(None);
        let writer_store = store.clone();
        let writer = tokio::spawn(async move {
            while persist_rx.changed().await.is_ok() {
                let snapshot = persist_rx.borrow_and_update().clone();
                if let Some((tasks, log)) = snapshot {
                    writer_store.save_tasks(&tasks).await;
                    writer_store.save_dispatch_log(&log).await;
                }
            }
        });

        let engine = Engine {
            repo: TaskRepository::new(tasks, log),
            scheduler: ReminderScheduler::new(config.remind_policy),
            sync: Synchronizer::new(transport, config.handshake_timeout),
            store,
            persist_tx,
            writer,
            events: event_tx.clone(),
            clock: config.clock.clone(),
            announced_sync_status: SyncStatus::Idle,
        };
        tokio::spawn(engine.run(command_rx, config.poll_interval));

        EngineHandle {
            commands: command_tx,
            events: event_tx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, poll_interval: Duration) {
        let mut poll = tokio::time::interval(poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None => break,
                    Some(Command::Shutdown(ack)) => {
                        shutdown_ack = Some(ack);
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },
                _ = poll.tick() => self.poll_reminders(),
                payload = self.sync.recv(), if self.sync.is_connected() => match payload {
                    Some(payload) => self.apply_inbound(&payload),
                    None => {
                        self.sync.handle_disconnect();
                        self.announce_sync_status();
                    }
                },
            }
        }

        // Retire the writer first: dropping the sender lets it drain any
        // queued snapshot and exit, so the final save below is the last
        // write to reach the store and the shutdown ack vouches for it.
        drop(self.persist_tx);
        let _ = self.writer.await;
        self.store.save_tasks(&self.repo.snapshot()).await;
        self.store.save_dispatch_log(self.repo.log()).await;
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
        info!("engine stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        let now = (self.clock)();
        match command {
            Command::Add(draft) => {
                self.repo.add(draft, now);
                self.after_local_mutation().await;
            }
            Command::Update(id, patch) => {
                if self.repo.update(&id, *patch) {
                    self.after_local_mutation().await;
                }
            }
            Command::Delete(id) => {
                if self.repo.delete(&id) {
                    self.after_local_mutation().await;
                }
            }
            Command::ChangeStatus { id, status, notes } => {
                if self.repo.change_status(&id, status, notes, now) {
                    self.after_local_mutation().await;
                }
            }
            Command::ToggleReminder(id) => {
                if self.repo.toggle_reminder(&id, now) {
                    self.after_local_mutation().await;
                }
            }
            Command::ToggleAttachmentReminder {
                task_id,
                attachment_id,
            } => {
                if self
                    .repo
                    .toggle_attachment_reminder(&task_id, &attachment_id, now)
                {
                    self.after_local_mutation().await;
                }
            }
            Command::RenewAttachment {
                task_id,
                attachment_id,
                renewal,
            } => {
                if self.repo.renew_attachment(&task_id, &attachment_id, renewal) {
                    self.after_local_mutation().await;
                }
            }
            Command::Reorder { from, to, reply } => {
                let result = self.repo.reorder(from, to);
                let ok = result.is_ok();
                let _ = reply.send(result);
                if ok {
                    self.after_local_mutation().await;
                }
            }
            Command::DismissReminder => {
                if self.scheduler.dismiss() {
                    debug!("reminder dismissed");
                }
            }
            Command::Join(room) => {
                self.announce(SyncStatus::Connecting);
                self.sync.join(&room, &self.repo.snapshot()).await;
                self.announce_sync_status();
            }
            Command::Leave => {
                self.sync.leave();
                self.announce_sync_status();
            }
            Command::Tasks(reply) => {
                let _ = reply.send(self.repo.snapshot());
            }
            Command::Filtered(filter, reply) => {
                let _ = reply.send(self.repo.filtered(&filter));
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.repo.stats());
            }
            Command::PendingReminder(reply) => {
                let _ = reply.send(self.scheduler.pending().cloned());
            }
            Command::SyncStatus(reply) => {
                let _ = reply.send(self.sync.status());
            }
            Command::Shutdown(_) => unreachable!("handled in the run loop"),
        }
    }

    /// A local edit was applied: persist, mirror to peers, notify observers.
    /// Remote applies go through `apply_inbound` instead and never broadcast.
    async fn after_local_mutation(&mut self) {
        self.persist();
        self.sync.broadcast(&self.repo.snapshot()).await;
        self.announce_sync_status();
        let _ = self.events.send(EngineEvent::CollectionChanged);
    }

    fn apply_inbound(&mut self, payload: &[u8]) {
        match self.sync.classify(payload) {
            Inbound::Apply(tasks) => {
                self.repo.replace_all(tasks);
                self.persist();
                let _ = self.events.send(EngineEvent::CollectionChanged);
            }
            Inbound::Discard => {}
        }
    }

    fn poll_reminders(&mut self) {
        let now = (self.clock)();
        let (tasks, log) = self.repo.tick_view();
        if let Some(due) = self.scheduler.tick(tasks, log, now) {
            self.persist();
            let _ = self.events.send(EngineEvent::ReminderDue(due));
        }
    }

    /// Asynchronous durability: hand the current snapshot to the writer
    /// task. The in-memory state is the source of truth and a slow or
    /// failing disk never holds up the loop.
    fn persist(&self) {
        let _ = self
            .persist_tx
            .send(Some((self.repo.snapshot(), self.repo.log().clone())));
    }

    fn announce(&mut self, status: SyncStatus) {
        if status != self.announced_sync_status {
            self.announced_sync_status = status;
            let _ = self.events.send(EngineEvent::SyncStatusChanged(status));
        }
    }

    fn announce_sync_status(&mut self) {
        let status = self.sync.status();
        self.announce(status);
    }
}
