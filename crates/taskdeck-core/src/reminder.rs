use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How often a reminder re-fires once armed. The string forms are the
/// on-disk and wire tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderInterval {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "1h")]
    Hourly,
}

impl ReminderInterval {
    pub const ALL: &[ReminderInterval] = &[
        ReminderInterval::None,
        ReminderInterval::OneMinute,
        ReminderInterval::FiveMinutes,
        ReminderInterval::TenMinutes,
        ReminderInterval::Hourly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderInterval::None => "none",
            ReminderInterval::OneMinute => "1m",
            ReminderInterval::FiveMinutes => "5m",
            ReminderInterval::TenMinutes => "10m",
            ReminderInterval::Hourly => "1h",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ReminderInterval::None => "None",
            ReminderInterval::OneMinute => "Every minute",
            ReminderInterval::FiveMinutes => "Every 5 minutes",
            ReminderInterval::TenMinutes => "Every 10 minutes",
            ReminderInterval::Hourly => "Every hour",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ReminderInterval::None),
            "1m" => Some(ReminderInterval::OneMinute),
            "5m" => Some(ReminderInterval::FiveMinutes),
            "10m" => Some(ReminderInterval::TenMinutes),
            "1h" => Some(ReminderInterval::Hourly),
            _ => None,
        }
    }

    /// `None` for the disabled interval, otherwise the firing period.
    pub fn period(&self) -> Option<Duration> {
        match self {
            ReminderInterval::None => None,
            ReminderInterval::OneMinute => Some(Duration::minutes(1)),
            ReminderInterval::FiveMinutes => Some(Duration::minutes(5)),
            ReminderInterval::TenMinutes => Some(Duration::minutes(10)),
            ReminderInterval::Hourly => Some(Duration::hours(1)),
        }
    }
}

impl Default for ReminderInterval {
    fn default() -> Self {
        ReminderInterval::None
    }
}

impl fmt::Display for ReminderInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Last-dispatch bookkeeping: entity id to the moment a reminder last fired
/// for it. Durable, so firing stays idempotent across restarts. Entries live
/// exactly as long as the entity that keys them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchLog {
    #[serde(default)]
    pub tasks: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub attachments: HashMap<String, DateTime<Utc>>,
}

impl DispatchLog {
    pub fn record_task(&mut self, task_id: &str, at: DateTime<Utc>) {
        self.tasks.insert(task_id.to_string(), at);
    }

    pub fn record_attachment(&mut self, attachment_id: &str, at: DateTime<Utc>) {
        self.attachments.insert(attachment_id.to_string(), at);
    }

    pub fn last_task_dispatch(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.tasks.get(task_id).copied()
    }

    pub fn last_attachment_dispatch(&self, attachment_id: &str) -> Option<DateTime<Utc>> {
        self.attachments.get(attachment_id).copied()
    }

    pub fn purge_task(&mut self, task_id: &str) {
        self.tasks.remove(task_id);
    }

    pub fn purge_attachment(&mut self, attachment_id: &str) {
        self.attachments.remove(attachment_id);
    }

    /// Drop every entry keyed by any of the given ids, wherever it lives.
    /// Used after bulk disarms where the caller only has a mixed id list.
    pub fn purge_ids(&mut self, ids: &[String]) {
        for id in ids {
            self.tasks.remove(id);
            self.attachments.remove(id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.attachments.is_empty()
    }
}
