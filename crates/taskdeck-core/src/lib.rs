pub mod attachment;
pub mod reminder;
pub mod task;

pub use attachment::{Attachment, AttachmentDraft, AttachmentRenewal};
pub use reminder::{DispatchLog, ReminderInterval};
pub use task::{Category, CollectionStats, Priority, Status, Task, TaskDraft, TaskFilter, TaskPatch};
