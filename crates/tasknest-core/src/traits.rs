//! External-infrastructure boundary traits.
//!
//! The scheduling core depends only on these two small interfaces — any
//! concrete time-triggered-job service or message broker can be
//! substituted behind them. The degradation controller wraps both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Notification;

/// A job handed to the external time-triggered job service.
///
/// The service invokes the configured callback with this spec at/after
/// `fire_at` — possibly more than once, possibly never if it is down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Stable job id; cancellation and local fallback timers key on it.
    pub id: String,
    pub owner: String,
    pub kind: JobKind,
    pub fire_at: DateTime<Utc>,
}

/// What a fired job re-enters the core as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    Reminder { task_id: String },
    Generation { task_id: String },
}

impl JobSpec {
    pub fn reminder(owner: &str, task_id: &str, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: reminder_job_id(task_id),
            owner: owner.to_string(),
            kind: JobKind::Reminder {
                task_id: task_id.to_string(),
            },
            fire_at,
        }
    }

    pub fn generation(owner: &str, task_id: &str, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: generation_job_id(task_id),
            owner: owner.to_string(),
            kind: JobKind::Generation {
                task_id: task_id.to_string(),
            },
            fire_at,
        }
    }
}

/// Job id for a task's one-shot reminder.
pub fn reminder_job_id(task_id: &str) -> String {
    format!("reminder-{task_id}")
}

/// Job id for a recurring task's generation job.
pub fn generation_job_id(task_id: &str) -> String {
    format!("recur-{task_id}")
}

/// External time-triggered job service boundary.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Register a job to fire at/after `fire_at`.
    async fn schedule(&self, job: &JobSpec) -> Result<()>;

    /// Cancel a registered job. Cancelling an unknown or already-fired
    /// job must succeed.
    async fn cancel(&self, job_id: &str) -> Result<()>;
}

/// External pub/sub broker boundary. At-least-once delivery, no
/// cross-channel ordering.
#[async_trait]
pub trait EventBroker: Send + Sync {
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;
}

/// Where reminder/generation notifications are handed off for live
/// delivery. Implemented by the gateway's stream hub; a collecting fake
/// stands in for tests.
pub trait NotificationSink: Send + Sync {
    fn push(&self, owner: &str, notification: Notification);
}
