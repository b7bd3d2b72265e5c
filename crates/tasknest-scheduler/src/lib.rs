//! # TaskNest Scheduler
//!
//! The scheduling and event-delivery core: recurrence calculation,
//! reminder scheduling, recurring task generation, typed event
//! publishing, and the degradation controller that keeps all of it
//! running when the external job service or broker is unreachable.
//!
//! ## Architecture
//! ```text
//! save/complete/delete hooks
//!   ├── ReminderScheduler ──┐
//!   ├── RecurringEngine ────┤
//!   │                       ▼
//!   │             DegradationController
//!   │               ├── JobService (external, schedule/cancel)
//!   │               ├── EventBroker (external, publish)
//!   │               ├── retry queue + drain loop
//!   │               └── local fallback timers
//!   └── fired jobs ──► dispatcher ──► OnReminderFired / OnGenerationFired
//! ```

pub mod clients;
pub mod degrade;
pub mod events;
pub mod recurrence;
pub mod reminders;
pub mod recurring;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testkit;

pub use clients::{HttpBroker, HttpJobService};
pub use degrade::{DegradationController, FeatureAvailability, Health};
pub use events::EventPublisher;
pub use recurrence::next_occurrence;
pub use reminders::ReminderScheduler;
pub use recurring::RecurringEngine;
pub use runtime::SchedulerRuntime;
