use std::path::PathBuf;

use async_trait::async_trait;
use taskdeck_core::{DispatchLog, Task};
use tracing::{debug, warn};

use crate::{
    attachment_reminders_key, migrate, task_reminders_key, tasks_key, StateStore, StoreError,
};

/// File-backed store: one JSON document per key under a base directory.
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    /// Read a document, `Ok(None)` if it was never written.
    async fn read_doc(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.resolve(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Internal(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Write through a temp file and rename, so a crash mid-write never
    /// leaves a half-written document behind.
    async fn write_doc(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Internal(format!("mkdir: {e}")))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| StoreError::Internal(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Internal(format!("rename {}: {e}", path.display())))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_tasks(&self) -> Vec<Task> {
        let raw = match self.read_doc(tasks_key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no persisted tasks, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!("failed to read tasks, starting empty: {e}");
                return Vec::new();
            }
        };
        match migrate::decode_tasks(&raw) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("corrupt task document, starting empty: {e}");
                Vec::new()
            }
        }
    }

    async fn save_tasks(&self, tasks: &[Task]) {
        let data = match serde_json::to_vec(tasks) {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to encode tasks, skipping save: {e}");
                return;
            }
        };
        if let Err(e) = self.write_doc(tasks_key(), &data).await {
            warn!("failed to save tasks: {e}");
        }
    }

    async fn load_dispatch_log(&self) -> DispatchLog {
        let mut log = DispatchLog::default();
        for (key, table) in [
            (task_reminders_key(), &mut log.tasks),
            (attachment_reminders_key(), &mut log.attachments),
        ] {
            match self.read_doc(key).await {
                Ok(Some(raw)) => match migrate::decode_dispatch_map(&raw) {
                    Ok(map) => *table = map,
                    Err(e) => warn!("corrupt {key}, starting empty: {e}"),
                },
                Ok(None) => {}
                Err(e) => warn!("failed to read {key}, starting empty: {e}"),
            }
        }
        log
    }

    async fn save_dispatch_log(&self, log: &DispatchLog) {
        for (key, table) in [
            (task_reminders_key(), &log.tasks),
            (attachment_reminders_key(), &log.attachments),
        ] {
            let data = match serde_json::to_vec(table) {
                Ok(data) => data,
                Err(e) => {
                    warn!("failed to encode {key}, skipping save: {e}");
                    continue;
                }
            };
            if let Err(e) = self.write_doc(key, &data).await {
                warn!("failed to save {key}: {e}");
            }
        }
    }
}
