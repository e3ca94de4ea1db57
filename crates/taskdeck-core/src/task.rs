use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachment::{Attachment, AttachmentDraft};
use crate::reminder::ReminderInterval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotStarted,
    InProgress,
    Done,
    /// A template for recurring work. Never itself completed and excluded
    /// from completion-percentage accounting.
    Recurring,
}

impl Status {
    pub const ALL: &[Status] = &[
        Status::NotStarted,
        Status::InProgress,
        Status::Done,
        Status::Recurring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "not_started",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Recurring => "recurring",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Status::NotStarted => "Not Started",
            Status::InProgress => "In Progress",
            Status::Done => "Done",
            Status::Recurring => "Recurring",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Status::NotStarted),
            "in_progress" => Some(Status::InProgress),
            "done" => Some(Status::Done),
            "recurring" => Some(Status::Recurring),
            _ => None,
        }
    }

    /// The terminal completed state carries the completion side effects
    /// (completion timestamp/notes, unconditional reminder disarm).
    pub fn is_done(&self) -> bool {
        matches!(self, Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Personal,
    Work,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Work => "work",
            Category::Custom => "custom",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Personal => "Personal",
            Category::Work => "Work",
            Category::Custom => "Custom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(Category::Personal),
            "work" => Some(Category::Work),
            "custom" => Some(Category::Custom),
            _ => None,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Personal
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// On-disk and wire field names are the historical camelCase ones
/// (`createdAt`, `reminderStartTime`, ...) so existing documents stay
/// readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "startDateTime")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_notes: Option<String>,
    #[serde(default)]
    pub reminder_interval: ReminderInterval,
    #[serde(default, rename = "reminderStartTime")]
    pub reminder_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Task {
    /// Materialize a draft: assigns a fresh id, stamps `created_at`, and
    /// starts in `NotStarted` with no completion data and nothing armed.
    pub fn from_draft(draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            category: draft.category,
            status: Status::NotStarted,
            created_at: now,
            start_at: draft.start_at,
            completed_at: None,
            completion_notes: None,
            reminder_interval: draft.reminder_interval,
            reminder_started_at: None,
            attachments: draft
                .attachments
                .into_iter()
                .map(Attachment::from_draft)
                .collect(),
        }
    }

    /// Disarm the task reminder and every attachment reminder. Returns the
    /// ids whose arming state was cleared, for bookkeeping purges.
    pub fn disarm_all_reminders(&mut self) -> Vec<String> {
        let mut cleared = Vec::new();
        if self.reminder_started_at.take().is_some() {
            cleared.push(self.id.clone());
        }
        for att in &mut self.attachments {
            if att.reminder_started_at.take().is_some() {
                cleared.push(att.id.clone());
            }
        }
        cleared
    }
}

/// Input for creating a task. Identity, creation time, status, and arming
/// state are assigned by the repository, not the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_interval: ReminderInterval,
    #[serde(default)]
    pub attachments: Vec<AttachmentDraft>,
}

/// Shallow-merge update. `None` leaves a field untouched; the double-`Option`
/// distinguishes "leave alone" from "clear". Status and completion data are
/// deliberately absent: those move only through `change_status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub start_at: Option<Option<DateTime<Utc>>>,
    pub reminder_interval: Option<ReminderInterval>,
    pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub search: String,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status) {
            return false;
        }
        if self.category.is_some_and(|c| c != task.category) {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        task.title.to_lowercase().contains(&needle)
            || task.description.to_lowercase().contains(&needle)
    }
}

/// Aggregate counts for dashboard-style consumers. Recurring templates are
/// excluded from the completion percentage denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionStats {
    pub total: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub done: usize,
    pub recurring: usize,
}

impl CollectionStats {
    pub fn of(tasks: &[Task]) -> Self {
        let mut stats = CollectionStats {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                Status::NotStarted => stats.not_started += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::Done => stats.done += 1,
                Status::Recurring => stats.recurring += 1,
            }
        }
        stats
    }

    pub fn completion_percent(&self) -> u8 {
        let completable = self.total - self.recurring;
        if completable == 0 {
            return 0;
        }
        ((self.done * 100) / completable) as u8
    }
}
