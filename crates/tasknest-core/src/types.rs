//! Task data model, lifecycle events, and notifications.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NestError, Result};

/// A user-owned unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID.
    pub id: String,
    /// Owner identifier — immutable after creation, set exclusively from
    /// the authenticated caller context, never from request bodies.
    pub owner: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Due date, UTC. Required when recurrence is set.
    pub due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    /// Normalized tag set: trimmed, lowercased, deduplicated.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub recurrence: Recurrence,
    /// Reminder offset in minutes before the due date.
    pub remind_before_mins: Option<u32>,
}

/// Task priority, ordered low < medium < high.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Recurrence cadence of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Recurrence::None)
    }
}

impl std::str::FromStr for Recurrence {
    type Err = NestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "monthly" => Ok(Recurrence::Monthly),
            other => Err(NestError::InvalidRecurrence(other.to_string())),
        }
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recurrence::None => write!(f, "none"),
            Recurrence::Daily => write!(f, "daily"),
            Recurrence::Weekly => write!(f, "weekly"),
            Recurrence::Monthly => write!(f, "monthly"),
        }
    }
}

impl Task {
    /// Create a new active task for an owner.
    pub fn new(owner: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            title: title.to_string(),
            description: String::new(),
            completed: false,
            created_at: now,
            updated_at: now,
            due_at: None,
            priority: Priority::default(),
            tags: Vec::new(),
            recurrence: Recurrence::default(),
            remind_before_mins: None,
        }
    }

    /// Trim, lowercase, and deduplicate the tag set in place.
    pub fn normalize_tags(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.tags = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
    }

    /// The reminder trigger time, if a due date and offset are both set.
    pub fn reminder_trigger(&self) -> Option<DateTime<Utc>> {
        let due = self.due_at?;
        let mins = self.remind_before_mins?;
        Some(due - Duration::minutes(i64::from(mins)))
    }

    /// Validate caller-supplied fields at save time.
    ///
    /// Rejections here are synchronous and final — nothing invalid is
    /// ever queued or retried. Trigger times that slip into the past
    /// between validation and scheduling are handled at fire time, not
    /// here.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(NestError::Validation("title must not be empty".into()));
        }
        if self.recurrence.is_recurring() && self.due_at.is_none() {
            return Err(NestError::Validation(
                "recurring tasks require a due date".into(),
            ));
        }
        if self.remind_before_mins.is_some() && self.due_at.is_none() {
            return Err(NestError::Validation(
                "a reminder offset requires a due date".into(),
            ));
        }
        if let (Some(due), Some(mins)) = (self.due_at, self.remind_before_mins)
            && due > now
            && Duration::minutes(i64::from(mins)) >= due - now
        {
            return Err(NestError::Validation(
                "reminder offset must be less than the time remaining until the due date".into(),
            ));
        }
        Ok(())
    }
}

/// Significant task operations, as published on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Created,
    Updated,
    Completed,
    ReminderDue,
    /// A created-event for an instance produced by recurring generation.
    Generated,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Updated => write!(f, "updated"),
            EventKind::Completed => write!(f, "completed"),
            EventKind::ReminderDue => write!(f, "reminder-due"),
            EventKind::Generated => write!(f, "generated"),
        }
    }
}

/// An immutable record of a significant task operation.
///
/// Events are append-only and delivered at least once — consumers must
/// deduplicate by `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_id: String,
    pub task_id: String,
    pub owner: String,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
    /// Small event-specific payload. No secrets.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskEvent {
    pub fn new(kind: EventKind, owner: &str, task_id: &str, payload: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            owner: owner.to_string(),
            kind,
            at: Utc::now(),
            payload,
        }
    }
}

/// What the live stream and per-owner offline queues carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// The originating event id — stream consumers dedup on this.
    pub event_id: String,
    pub kind: EventKind,
    pub title: String,
    pub body: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn from_event(event: &TaskEvent, title: &str, body: &str) -> Self {
        Self {
            event_id: event.event_id.clone(),
            kind: event.kind,
            title: title.to_string(),
            body: body.to_string(),
            at: event.at,
        }
    }
}

/// Scheduled one-shot reminder state, persisted per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderState {
    pub task_id: String,
    pub trigger_at: DateTime<Utc>,
    /// Set once delivered; makes reminder firing idempotent under
    /// at-least-once job delivery.
    #[serde(default)]
    pub sent: bool,
}

/// Scheduling metadata for a recurring task's periodic regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub parent_id: String,
    pub pattern: Recurrence,
    /// The parent's original due date — keeps day-of-week/day-of-month
    /// stable across generated instances.
    pub anchor: DateTime<Utc>,
    /// Due date of the most recently generated instance (starts at the
    /// parent's own due date).
    pub last_due: DateTime<Utc>,
}
