//! Task lifecycle and reminder engine.
//!
//! [`repository`] owns the authoritative collection and its mutation rules,
//! [`scheduler`] decides when reminders fire, and [`engine`] is the actor
//! that serializes UI commands, the reminder poll, and inbound collaboration
//! messages onto one logical thread of control.

pub mod engine;
pub mod repository;
pub mod scheduler;

pub use engine::{Clock, Engine, EngineConfig, EngineError, EngineEvent, EngineHandle};
pub use repository::{RepositoryError, TaskRepository};
pub use scheduler::{DueReminder, ReminderScheduler, RemindPolicy};
