//! Load-time normalization of persisted documents.
//!
//! Older documents differ from the current schema in a few known ways: a
//! single legacy `attachment` object instead of the `attachments` list, the
//! pre-lifecycle `"todo"` status token, and millisecond-epoch numbers where
//! timestamps are now RFC 3339 strings. All of that is upgraded here, in one
//! pass, before the records reach the typed model. Records that still fail
//! to decode after upgrading are dropped with a warning rather than poisoning
//! the whole load.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use taskdeck_core::Task;
use tracing::warn;

/// Decode a persisted task collection, upgrading legacy records in place.
pub fn decode_tasks(raw: &[u8]) -> Result<Vec<Task>, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    let Value::Array(records) = value else {
        return Err(serde::de::Error::custom("task document is not an array"));
    };
    Ok(records.into_iter().filter_map(upgrade_record).collect())
}

fn upgrade_record(mut record: Value) -> Option<Task> {
    if let Some(obj) = record.as_object_mut() {
        // Pre-lifecycle documents used a two-state status.
        if let Some(Value::String(status)) = obj.get("status") {
            if status == "todo" {
                obj.insert("status".into(), json!("not_started"));
            }
        }

        // Single legacy attachment becomes a one-element list with a fresh id.
        if !obj.contains_key("attachments") {
            if let Some(legacy) = obj.remove("attachment") {
                if let Some(att) = upgrade_legacy_attachment(legacy) {
                    obj.insert("attachments".into(), json!([att]));
                }
            }
        }

        // The due-date field predates startDateTime and has no successor.
        obj.remove("dueDate");

        for key in ["createdAt", "startDateTime", "completedAt", "reminderStartTime"] {
            normalize_timestamp(obj, key);
        }
        if let Some(Value::Array(attachments)) = obj.get_mut("attachments") {
            for att in attachments {
                if let Some(att_obj) = att.as_object_mut() {
                    normalize_timestamp(att_obj, "expiryDate");
                    normalize_timestamp(att_obj, "reminderStartTime");
                }
            }
        }
    }

    match serde_json::from_value::<Task>(record) {
        Ok(task) => Some(task),
        Err(e) => {
            warn!("dropping unreadable task record: {e}");
            None
        }
    }
}

fn upgrade_legacy_attachment(legacy: Value) -> Option<Value> {
    let obj = legacy.as_object()?;
    let name = obj.get("name").and_then(Value::as_str)?;
    // Legacy payloads were data URLs; keep only the base64 body.
    let data = obj
        .get("data")
        .and_then(Value::as_str)
        .map(|raw| match raw.rsplit_once("base64,") {
            Some((_, body)) => body.to_string(),
            None => raw.to_string(),
        })
        .unwrap_or_default();
    Some(json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "name": name,
        "data": data,
        "reminderInterval": "none",
    }))
}

/// Rewrite a millisecond-epoch number as an RFC 3339 string, leaving strings
/// (and absent/null fields) alone.
fn normalize_timestamp(obj: &mut serde_json::Map<String, Value>, key: &str) {
    if let Some(Value::Number(n)) = obj.get(key) {
        let upgraded = n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| json!(dt.to_rfc3339()));
        match upgraded {
            Some(ts) => {
                obj.insert(key.to_string(), ts);
            }
            None => {
                warn!("dropping unreadable {key} timestamp");
                obj.remove(key);
            }
        }
    }
}

/// Decode a dispatch-bookkeeping map. Unreadable entries are skipped.
pub fn decode_dispatch_map(raw: &[u8]) -> Result<HashMap<String, DateTime<Utc>>, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    let Value::Object(entries) = value else {
        return Err(serde::de::Error::custom("dispatch document is not an object"));
    };
    let mut map = HashMap::new();
    for (id, entry) in entries {
        let parsed = match entry {
            Value::String(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
            _ => None,
        };
        match parsed {
            Some(at) => {
                map.insert(id, at);
            }
            None => warn!("dropping unreadable dispatch entry for {id}"),
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_core::{ReminderInterval, Status};

    #[test]
    fn current_schema_passes_through() {
        let raw = serde_json::to_vec(&json!([{
            "id": "t-1",
            "title": "write report",
            "status": "in_progress",
            "createdAt": "2026-08-01T10:00:00Z",
            "reminderInterval": "5m",
        }]))
        .unwrap();
        let tasks = decode_tasks(&raw).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, Status::InProgress);
        assert_eq!(tasks[0].reminder_interval, ReminderInterval::FiveMinutes);
        assert!(tasks[0].attachments.is_empty());
        assert!(tasks[0].completed_at.is_none());
    }

    #[test]
    fn legacy_record_is_fully_upgraded() {
        let raw = serde_json::to_vec(&json!([{
            "id": "t-legacy",
            "title": "old one",
            "status": "todo",
            "createdAt": 1_700_000_000_000_i64,
            "dueDate": "2024-01-01",
            "attachment": {
                "name": "scan.png",
                "data": "data:image/png;base64,AQID",
            },
        }]))
        .unwrap();
        let tasks = decode_tasks(&raw).unwrap();
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.status, Status::NotStarted);
        assert_eq!(task.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(task.attachments.len(), 1);
        assert_eq!(task.attachments[0].name, "scan.png");
        assert_eq!(task.attachments[0].data, vec![1, 2, 3]);
        assert!(!task.attachments[0].id.is_empty());
        assert_eq!(task.attachments[0].reminder_interval, ReminderInterval::None);
    }

    #[test]
    fn unreadable_record_is_dropped_not_fatal() {
        let raw = serde_json::to_vec(&json!([
            {"id": "ok", "title": "fine", "status": "done",
             "createdAt": "2026-08-01T10:00:00Z",
             "completedAt": "2026-08-02T10:00:00Z"},
            {"title": 42},
        ]))
        .unwrap();
        let tasks = decode_tasks(&raw).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "ok");
    }

    #[test]
    fn non_array_document_is_an_error() {
        assert!(decode_tasks(b"{\"not\": \"an array\"}").is_err());
        assert!(decode_tasks(b"garbage").is_err());
    }

    #[test]
    fn dispatch_map_accepts_both_timestamp_forms() {
        let raw = serde_json::to_vec(&json!({
            "t-1": "2026-08-01T10:00:00Z",
            "t-2": 1_700_000_000_000_i64,
            "t-bad": true,
        }))
        .unwrap();
        let map = decode_dispatch_map(&raw).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["t-2"].timestamp_millis(), 1_700_000_000_000);
    }
}
