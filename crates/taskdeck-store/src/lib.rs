mod local;
mod memory;
pub mod migrate;

pub use local::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use taskdeck_core::{DispatchLog, Task};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Internal(String),
}

/// Durable read/write of the task collection and the reminder dispatch
/// bookkeeping.
///
/// The trait surface is deliberately infallible: a load that cannot read or
/// parse its document logs a diagnostic and yields the empty value, and a
/// save is best-effort durability, never an error the caller has to handle.
/// The in-memory collection, not the store, is the source of truth.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_tasks(&self) -> Vec<Task>;

    async fn save_tasks(&self, tasks: &[Task]);

    async fn load_dispatch_log(&self) -> DispatchLog;

    async fn save_dispatch_log(&self, log: &DispatchLog);
}

// -- Document keys --

pub fn tasks_key() -> &'static str {
    "tasks.json"
}

pub fn task_reminders_key() -> &'static str {
    "task_reminders.json"
}

pub fn attachment_reminders_key() -> &'static str {
    "attachment_reminders.json"
}
