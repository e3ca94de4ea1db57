use chrono::{DateTime, Utc};
use taskdeck_core::{
    AttachmentRenewal, CollectionStats, DispatchLog, Status, Task, TaskDraft, TaskFilter, TaskPatch,
};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("reorder index out of range: {from} -> {to} over {len} tasks")]
    ReorderOutOfRange { from: usize, to: usize, len: usize },
}

/// The authoritative in-memory task collection plus its dispatch bookkeeping.
///
/// All mutation of the collection funnels through these methods. Operations
/// addressing an id that no longer exists are deliberate no-ops: a
/// deleted-then-edited race from a stale caller must not crash anything.
/// Durability and broadcasting are the engine's concern, not the
/// repository's.
pub struct TaskRepository {
    tasks: Vec<Task>,
    log: DispatchLog,
}

impl TaskRepository {
    pub fn new(tasks: Vec<Task>, log: DispatchLog) -> Self {
        Self { tasks, log }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn log(&self) -> &DispatchLog {
        &self.log
    }

    /// Split borrow for the scheduler: it reads tasks while updating the log.
    pub fn tick_view(&mut self) -> (&[Task], &mut DispatchLog) {
        (&self.tasks, &mut self.log)
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats::of(&self.tasks)
    }

    pub fn filtered(&self, filter: &TaskFilter) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect()
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Create a task from a draft, newest first.
    pub fn add(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> &Task {
        let task = Task::from_draft(draft, now);
        self.tasks.insert(0, task);
        &self.tasks[0]
    }

    /// Shallow-merge a patch. Setting `reminder_interval` to none while the
    /// task reminder is armed disarms it and purges its bookkeeping;
    /// replacing `attachments` purges bookkeeping for every removed id and
    /// disarms any attachment whose interval was turned off while armed.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> bool {
        // Collect purges first; the log and the task can't be borrowed together.
        let mut purge_task = false;
        let mut purge_attachments = Vec::new();

        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("update for unknown task {id}, ignoring");
            return false;
        };

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(start_at) = patch.start_at {
            task.start_at = start_at;
        }
        if let Some(interval) = patch.reminder_interval {
            task.reminder_interval = interval;
            if interval.period().is_none() && task.reminder_started_at.take().is_some() {
                purge_task = true;
            }
        }
        if let Some(mut attachments) = patch.attachments {
            for att in &mut attachments {
                if att.reminder_interval.period().is_none()
                    && att.reminder_started_at.take().is_some()
                {
                    purge_attachments.push(att.id.clone());
                }
            }
            for old in &task.attachments {
                if !attachments.iter().any(|a| a.id == old.id) {
                    purge_attachments.push(old.id.clone());
                }
            }
            task.attachments = attachments;
        }

        if purge_task {
            self.log.purge_task(id);
        }
        for att_id in &purge_attachments {
            self.log.purge_attachment(att_id);
        }
        true
    }

    /// Remove a task and every bookkeeping entry keyed by it or by its
    /// attachments, so nothing orphaned can ever fire again.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(pos) = self.tasks.iter().position(|t| t.id == id) else {
            debug!("delete for unknown task {id}, ignoring");
            return false;
        };
        let task = self.tasks.remove(pos);
        self.log.purge_task(&task.id);
        for att in &task.attachments {
            self.log.purge_attachment(&att.id);
        }
        true
    }

    /// Apply the status state machine. Entering `Done` stamps completion and
    /// unconditionally disarms the task and all attachment reminders;
    /// leaving `Done` clears the completion timestamp and notes.
    pub fn change_status(
        &mut self,
        id: &str,
        status: Status,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut cleared = Vec::new();
        let changed = {
            let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
                debug!("status change for unknown task {id}, ignoring");
                return false;
            };
            let old = task.status;
            task.status = status;
            if status.is_done() && !old.is_done() {
                task.completed_at = Some(now);
                task.completion_notes = notes;
                cleared = task.disarm_all_reminders();
            } else if old.is_done() && !status.is_done() {
                task.completed_at = None;
                task.completion_notes = None;
            }
            old != status
        };
        self.log.purge_ids(&cleared);
        changed
    }

    /// Flip the task reminder. Arming records `now` as the measuring point;
    /// disarming also drops the dispatch bookkeeping. Arming a task whose
    /// interval is none is rejected as a no-op.
    pub fn toggle_reminder(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let mut purge = false;
        let changed = {
            let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
                debug!("reminder toggle for unknown task {id}, ignoring");
                return false;
            };
            if task.reminder_started_at.take().is_some() {
                purge = true;
                true
            } else if task.reminder_interval.period().is_some() {
                task.reminder_started_at = Some(now);
                true
            } else {
                debug!("cannot arm task {id}: no reminder interval set");
                false
            }
        };
        if purge {
            self.log.purge_task(id);
        }
        changed
    }

    pub fn toggle_attachment_reminder(
        &mut self,
        task_id: &str,
        attachment_id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut purge = false;
        let changed = {
            let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
                debug!("attachment reminder toggle for unknown task {task_id}, ignoring");
                return false;
            };
            let Some(att) = task.attachments.iter_mut().find(|a| a.id == attachment_id) else {
                debug!("reminder toggle for unknown attachment {attachment_id}, ignoring");
                return false;
            };
            if att.reminder_started_at.take().is_some() {
                purge = true;
                true
            } else if att.reminder_interval.period().is_some() {
                att.reminder_started_at = Some(now);
                true
            } else {
                debug!("cannot arm attachment {attachment_id}: no reminder interval set");
                false
            }
        };
        if purge {
            self.log.purge_attachment(attachment_id);
        }
        changed
    }

    /// Replace an attachment's content in place. Id and arming state are
    /// stable across renewal.
    pub fn renew_attachment(
        &mut self,
        task_id: &str,
        attachment_id: &str,
        renewal: AttachmentRenewal,
    ) -> bool {
        let Some(task) = self.find_mut(task_id) else {
            debug!("renewal for unknown task {task_id}, ignoring");
            return false;
        };
        let Some(att) = task.attachments.iter_mut().find(|a| a.id == attachment_id) else {
            debug!("renewal for unknown attachment {attachment_id}, ignoring");
            return false;
        };
        att.renew(renewal);
        true
    }

    /// Move one task, preserving every other relative order. Out-of-range
    /// indices are a caller error; nothing is partially applied.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), RepositoryError> {
        let len = self.tasks.len();
        if from >= len || to >= len {
            return Err(RepositoryError::ReorderOutOfRange { from, to, len });
        }
        let task = self.tasks.remove(from);
        self.tasks.insert(to, task);
        Ok(())
    }

    /// Wholesale replacement from a peer snapshot (last-writer-wins).
    /// Bookkeeping entries whose entity disappeared with the replacement are
    /// purged, same as if the tasks had been deleted locally.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        let task_ids: std::collections::HashSet<&str> =
            self.tasks.iter().map(|t| t.id.as_str()).collect();
        let att_ids: std::collections::HashSet<&str> = self
            .tasks
            .iter()
            .flat_map(|t| t.attachments.iter().map(|a| a.id.as_str()))
            .collect();
        self.log.tasks.retain(|id, _| task_ids.contains(id.as_str()));
        self.log
            .attachments
            .retain(|id, _| att_ids.contains(id.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_core::{Attachment, AttachmentDraft, Priority, ReminderInterval};

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            category: Default::default(),
            start_at: None,
            reminder_interval: ReminderInterval::FiveMinutes,
            attachments: Vec::new(),
        }
    }

    fn draft_with_attachment(title: &str) -> TaskDraft {
        TaskDraft {
            attachments: vec![AttachmentDraft {
                name: "file.bin".into(),
                data: vec![7],
                expires_at: None,
                reminder_interval: ReminderInterval::OneMinute,
            }],
            ..draft(title)
        }
    }

    fn repo() -> TaskRepository {
        TaskRepository::new(Vec::new(), DispatchLog::default())
    }

    #[test]
    fn add_prepends_newest_first() {
        let mut repo = repo();
        let now = Utc::now();
        repo.add(draft("first"), now);
        repo.add(draft("second"), now);
        assert_eq!(repo.tasks()[0].title, "second");
        assert_eq!(repo.tasks()[1].title, "first");
    }

    #[test]
    fn operations_on_unknown_ids_are_noops() {
        let mut repo = repo();
        let now = Utc::now();
        assert!(!repo.update("ghost", TaskPatch::default()));
        assert!(!repo.delete("ghost"));
        assert!(!repo.change_status("ghost", Status::Done, None, now));
        assert!(!repo.toggle_reminder("ghost", now));
        assert!(!repo.toggle_attachment_reminder("ghost", "ghost-att", now));
        assert!(repo.tasks().is_empty());
    }

    #[test]
    fn completing_sets_and_reversal_clears_completion_data() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft("t"), now).id.clone();

        repo.change_status(&id, Status::Done, Some("all wrapped up".into()), now);
        let task = &repo.tasks()[0];
        assert_eq!(task.completed_at, Some(now));
        assert_eq!(task.completion_notes.as_deref(), Some("all wrapped up"));

        repo.change_status(&id, Status::InProgress, None, now);
        let task = &repo.tasks()[0];
        assert_eq!(task.status, Status::InProgress);
        assert!(task.completed_at.is_none());
        assert!(task.completion_notes.is_none());
    }

    #[test]
    fn completing_disarms_task_and_attachment_reminders() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft_with_attachment("t"), now).id.clone();
        let att_id = repo.tasks()[0].attachments[0].id.clone();

        repo.toggle_reminder(&id, now);
        repo.toggle_attachment_reminder(&id, &att_id, now);
        repo.log.record_task(&id, now);
        repo.log.record_attachment(&att_id, now);

        repo.change_status(&id, Status::Done, None, now);
        let task = &repo.tasks()[0];
        assert!(task.reminder_started_at.is_none());
        assert!(task.attachments[0].reminder_started_at.is_none());
        assert!(repo.log().last_task_dispatch(&id).is_none());
        assert!(repo.log().last_attachment_dispatch(&att_id).is_none());
    }

    #[test]
    fn toggle_arms_and_disarms_with_bookkeeping_purge() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft("t"), now).id.clone();

        assert!(repo.toggle_reminder(&id, now));
        assert_eq!(repo.tasks()[0].reminder_started_at, Some(now));

        repo.log.record_task(&id, now);
        assert!(repo.toggle_reminder(&id, now));
        assert!(repo.tasks()[0].reminder_started_at.is_none());
        assert!(repo.log().last_task_dispatch(&id).is_none());
    }

    #[test]
    fn arming_without_interval_is_rejected() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo
            .add(
                TaskDraft {
                    reminder_interval: ReminderInterval::None,
                    ..draft("no interval")
                },
                now,
            )
            .id
            .clone();
        assert!(!repo.toggle_reminder(&id, now));
        assert!(repo.tasks()[0].reminder_started_at.is_none());
    }

    #[test]
    fn update_disabling_interval_while_armed_disarms_and_purges() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft("t"), now).id.clone();
        repo.toggle_reminder(&id, now);
        repo.log.record_task(&id, now);

        repo.update(
            &id,
            TaskPatch {
                reminder_interval: Some(ReminderInterval::None),
                ..Default::default()
            },
        );
        let task = &repo.tasks()[0];
        assert_eq!(task.reminder_interval, ReminderInterval::None);
        assert!(task.reminder_started_at.is_none());
        assert!(repo.log().last_task_dispatch(&id).is_none());
    }

    #[test]
    fn update_replacing_attachments_purges_removed_ids() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft_with_attachment("t"), now).id.clone();
        let removed_id = repo.tasks()[0].attachments[0].id.clone();
        repo.log.record_attachment(&removed_id, now);

        let replacement = Attachment::from_draft(AttachmentDraft {
            name: "new.bin".into(),
            data: vec![9],
            expires_at: None,
            reminder_interval: ReminderInterval::TenMinutes,
        });
        repo.update(
            &id,
            TaskPatch {
                attachments: Some(vec![replacement.clone()]),
                ..Default::default()
            },
        );

        assert_eq!(repo.tasks()[0].attachments[0].id, replacement.id);
        assert!(repo.log().last_attachment_dispatch(&removed_id).is_none());
    }

    #[test]
    fn update_attachment_interval_off_while_armed_disarms() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft_with_attachment("t"), now).id.clone();
        let att_id = repo.tasks()[0].attachments[0].id.clone();
        repo.toggle_attachment_reminder(&id, &att_id, now);
        repo.log.record_attachment(&att_id, now);

        let mut kept = repo.tasks()[0].attachments[0].clone();
        kept.reminder_interval = ReminderInterval::None;
        repo.update(
            &id,
            TaskPatch {
                attachments: Some(vec![kept]),
                ..Default::default()
            },
        );

        let att = &repo.tasks()[0].attachments[0];
        assert_eq!(att.id, att_id, "id is stable across the edit");
        assert!(att.reminder_started_at.is_none());
        assert!(repo.log().last_attachment_dispatch(&att_id).is_none());
    }

    #[test]
    fn delete_purges_task_and_attachment_bookkeeping() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft_with_attachment("t"), now).id.clone();
        let att_id = repo.tasks()[0].attachments[0].id.clone();
        repo.log.record_task(&id, now);
        repo.log.record_attachment(&att_id, now);

        assert!(repo.delete(&id));
        assert!(repo.tasks().is_empty());
        assert!(repo.log().is_empty());
    }

    #[test]
    fn renew_attachment_keeps_id() {
        let mut repo = repo();
        let now = Utc::now();
        let id = repo.add(draft_with_attachment("t"), now).id.clone();
        let att_id = repo.tasks()[0].attachments[0].id.clone();

        assert!(repo.renew_attachment(
            &id,
            &att_id,
            AttachmentRenewal {
                name: "renewed.bin".into(),
                data: vec![1, 2],
                expires_at: Some(now),
            },
        ));
        let att = &repo.tasks()[0].attachments[0];
        assert_eq!(att.id, att_id);
        assert_eq!(att.name, "renewed.bin");
        assert_eq!(att.expires_at, Some(now));
    }

    #[test]
    fn reorder_moves_one_element_and_preserves_the_rest() {
        let mut repo = repo();
        let now = Utc::now();
        for title in ["a", "b", "c", "d"] {
            repo.add(draft(title), now);
        }
        // Collection is newest-first: d c b a
        repo.reorder(0, 2).unwrap();
        let titles: Vec<&str> = repo.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn reorder_out_of_range_is_an_error_with_no_mutation() {
        let mut repo = repo();
        let now = Utc::now();
        repo.add(draft("only"), now);
        assert!(matches!(
            repo.reorder(0, 5),
            Err(RepositoryError::ReorderOutOfRange { .. })
        ));
        assert!(matches!(
            repo.reorder(3, 0),
            Err(RepositoryError::ReorderOutOfRange { .. })
        ));
        assert_eq!(repo.tasks().len(), 1);
    }

    #[test]
    fn replace_all_prunes_orphaned_bookkeeping() {
        let mut repo = repo();
        let now = Utc::now();
        let keep = repo.add(draft("keep"), now).clone();
        let drop_id = repo.add(draft("drop"), now).id.clone();
        repo.log.record_task(&keep.id, now);
        repo.log.record_task(&drop_id, now);

        repo.replace_all(vec![keep.clone()]);
        assert_eq!(repo.tasks().len(), 1);
        assert_eq!(repo.log().last_task_dispatch(&keep.id), Some(now));
        assert!(repo.log().last_task_dispatch(&drop_id).is_none());
    }
}
