use std::sync::Mutex;

use async_trait::async_trait;
use taskdeck_core::{DispatchLog, Task};

use crate::StateStore;

/// In-memory store for tests and ephemeral sessions. Nothing survives the
/// process, which is exactly the durability callers must already tolerate.
#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<Task>>,
    log: Mutex<DispatchLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_tasks(&self) -> Vec<Task> {
        self.tasks.lock().expect("store lock poisoned").clone()
    }

    async fn save_tasks(&self, tasks: &[Task]) {
        *self.tasks.lock().expect("store lock poisoned") = tasks.to_vec();
    }

    async fn load_dispatch_log(&self) -> DispatchLog {
        self.log.lock().expect("store lock poisoned").clone()
    }

    async fn save_dispatch_log(&self, log: &DispatchLog) {
        *self.log.lock().expect("store lock poisoned") = log.clone();
    }
}
