use serde::{Deserialize, Serialize};
use taskdeck_core::Task;

/// The one wire message: a full-state snapshot tagged with the session that
/// sent it. Receivers treat every message as a whole-document replacement;
/// there is no acknowledgement and no field-level merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub tasks: Vec<Task>,
}

impl Envelope {
    pub fn new(sender: impl Into<String>, tasks: Vec<Task>) -> Self {
        Envelope {
            sender: sender.into(),
            tasks,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskdeck_core::TaskDraft;

    #[test]
    fn round_trips_with_tasks() {
        let task = Task::from_draft(
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
        );
        let envelope = Envelope::new("session-1", vec![task.clone()]);
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded.sender, "session-1");
        assert_eq!(decoded.tasks.len(), 1);
        assert_eq!(decoded.tasks[0].id, task.id);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Envelope::decode(b"not json").is_err());
        assert!(Envelope::decode(b"{\"sender\": 7}").is_err());
    }
}
