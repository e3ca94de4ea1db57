use chrono::{DateTime, Utc};
use taskdeck_core::{Attachment, DispatchLog, Status, Task};
use tracing::debug;

/// Which task statuses are eligible to fire reminders. The historical
/// behavior was inconsistent, so this is explicit configuration rather than
/// a hard-coded guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemindPolicy {
    /// Only tasks that have not been started yet.
    NotStartedOnly,
    /// Everything that is not finished: not-started and in-progress.
    UntilDone,
}

impl RemindPolicy {
    pub fn allows(&self, status: Status) -> bool {
        match self {
            RemindPolicy::NotStartedOnly => status == Status::NotStarted,
            RemindPolicy::UntilDone => {
                matches!(status, Status::NotStarted | Status::InProgress)
            }
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not-started-only" => Some(RemindPolicy::NotStartedOnly),
            "until-done" => Some(RemindPolicy::UntilDone),
            _ => None,
        }
    }
}

impl Default for RemindPolicy {
    fn default() -> Self {
        RemindPolicy::NotStartedOnly
    }
}

/// A reminder selected for presentation, carrying the entity it fired for.
#[derive(Debug, Clone, PartialEq)]
pub enum DueReminder {
    Task {
        task: Task,
    },
    Attachment {
        task_id: String,
        task_title: String,
        attachment: Attachment,
    },
}

impl DueReminder {
    /// The id the dispatch bookkeeping is keyed by.
    pub fn entity_id(&self) -> &str {
        match self {
            DueReminder::Task { task } => &task.id,
            DueReminder::Attachment { attachment, .. } => &attachment.id,
        }
    }
}

/// Level-triggered reminder evaluator.
///
/// Each tick scans the collection for the first due candidate, task-level
/// before attachment-level, and surfaces at most one reminder at a time: a
/// second candidate waits until the first is dismissed. Timing is measured
/// against the dispatch log, never against presentation state, so ticks are
/// freely repeatable and a restart cannot re-fire within an interval window.
pub struct ReminderScheduler {
    policy: RemindPolicy,
    pending: Option<DueReminder>,
}

impl ReminderScheduler {
    pub fn new(policy: RemindPolicy) -> Self {
        Self {
            policy,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&DueReminder> {
        self.pending.as_ref()
    }

    /// Clear the presented reminder. The next tick may select a new
    /// candidate; eligibility is driven by the dispatch log, so dismissing
    /// never loses the next cycle.
    pub fn dismiss(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Evaluate the collection at `now`. Records the dispatch in `log`
    /// (caller persists it) and holds the selection until dismissed.
    pub fn tick(
        &mut self,
        tasks: &[Task],
        log: &mut DispatchLog,
        now: DateTime<Utc>,
    ) -> Option<DueReminder> {
        if self.pending.is_some() {
            return None;
        }

        // Task-level reminders outrank attachment-level in the same tick.
        for task in tasks {
            if !self.policy.allows(task.status) {
                continue;
            }
            if is_due(
                task.reminder_interval.period(),
                task.reminder_started_at,
                log.last_task_dispatch(&task.id),
                now,
            ) {
                debug!("task reminder due: {} ({})", task.title, task.id);
                log.record_task(&task.id, now);
                let due = DueReminder::Task { task: task.clone() };
                self.pending = Some(due.clone());
                return Some(due);
            }
        }

        for task in tasks {
            if !self.policy.allows(task.status) {
                continue;
            }
            for att in &task.attachments {
                if is_due(
                    att.reminder_interval.period(),
                    att.reminder_started_at,
                    log.last_attachment_dispatch(&att.id),
                    now,
                ) {
                    debug!("attachment reminder due: {} ({})", att.name, att.id);
                    log.record_attachment(&att.id, now);
                    let due = DueReminder::Attachment {
                        task_id: task.id.clone(),
                        task_title: task.title.clone(),
                        attachment: att.clone(),
                    };
                    self.pending = Some(due.clone());
                    return Some(due);
                }
            }
        }

        None
    }
}

/// One full interval must elapse since the later of the arm time and the
/// last dispatch. A newly armed reminder therefore first fires relative to
/// its arm time, not to a tick boundary.
fn is_due(
    period: Option<chrono::Duration>,
    armed_at: Option<DateTime<Utc>>,
    last_dispatch: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let (Some(period), Some(armed_at)) = (period, armed_at) else {
        return false;
    };
    let basis = match last_dispatch {
        Some(last) => last.max(armed_at),
        None => armed_at,
    };
    now - basis >= period
}
