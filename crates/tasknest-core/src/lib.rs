//! # TaskNest Core
//!
//! Shared foundation for the TaskNest workspace: the task data model,
//! lifecycle events, notifications, the error taxonomy, configuration,
//! and the two traits that mark the external-infrastructure boundary
//! (`JobService`, `EventBroker`).
//!
//! Everything in this crate is I/O-free except config file loading —
//! the heavier machinery lives in `tasknest-store`, `tasknest-scheduler`
//! and `tasknest-gateway`.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::NestConfig;
pub use error::{NestError, Result};
pub use traits::{EventBroker, JobKind, JobService, JobSpec, NotificationSink};
pub use types::{
    EventKind, GenerationJob, Notification, Priority, Recurrence, ReminderState, Task, TaskEvent,
};
