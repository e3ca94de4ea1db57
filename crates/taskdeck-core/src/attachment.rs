use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reminder::ReminderInterval;

/// A file attached to a task. The payload is opaque to the core; size limits
/// are enforced by whoever produced the draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    #[serde(default, rename = "expiryDate")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_interval: ReminderInterval,
    #[serde(default, rename = "reminderStartTime")]
    pub reminder_started_at: Option<DateTime<Utc>>,
}

impl Attachment {
    pub fn from_draft(draft: AttachmentDraft) -> Self {
        Attachment {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name,
            data: draft.data,
            expires_at: draft.expires_at,
            reminder_interval: draft.reminder_interval,
            reminder_started_at: None,
        }
    }

    /// Replace payload, name, and expiry in place. The id and the arming
    /// state survive renewal.
    pub fn renew(&mut self, renewal: AttachmentRenewal) {
        self.name = renewal.name;
        self.data = renewal.data;
        self.expires_at = renewal.expires_at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentDraft {
    pub name: String,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_interval: ReminderInterval,
}

/// Replacement content for an existing attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRenewal {
    pub name: String,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Serde adapter: binary payloads travel as base64 strings in JSON.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
