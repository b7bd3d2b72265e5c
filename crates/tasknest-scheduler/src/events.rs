//! Typed event publisher — serializes task lifecycle events and routes
//! them to logical broker channels, with an audit mirror for every event.

use std::sync::Arc;

use tasknest_core::{EventKind, Result, TaskEvent};

use crate::degrade::DegradationController;

pub const CHANNEL_LIFECYCLE: &str = "task.lifecycle";
pub const CHANNEL_REMINDER: &str = "task.reminder";
pub const CHANNEL_RECURRENCE: &str = "task.recurrence";
pub const CHANNEL_AUDIT: &str = "task.audit";

pub struct EventPublisher {
    controller: Arc<DegradationController>,
}

impl EventPublisher {
    pub fn new(controller: Arc<DegradationController>) -> Self {
        Self { controller }
    }

    /// Logical channel for an event type.
    pub fn channel_for(kind: EventKind) -> &'static str {
        match kind {
            EventKind::Created | EventKind::Updated | EventKind::Completed => CHANNEL_LIFECYCLE,
            EventKind::ReminderDue => CHANNEL_REMINDER,
            EventKind::Generated => CHANNEL_RECURRENCE,
        }
    }

    /// Build and publish an event with a fresh id and current UTC
    /// timestamp. Fire-and-forget beyond the client timeout: broker
    /// failures are queued by the degradation controller, never surfaced
    /// here. The audit mirror is sent second, which keeps same-task
    /// audit ordering within this process.
    pub async fn publish(
        &self,
        kind: EventKind,
        owner: &str,
        task_id: &str,
        payload: serde_json::Value,
    ) -> Result<TaskEvent> {
        let event = TaskEvent::new(kind, owner, task_id, payload);
        let message = serde_json::to_string(&event)?;
        let channel = Self::channel_for(kind);
        self.controller.publish(channel, &message).await;
        self.controller.publish(CHANNEL_AUDIT, &message).await;
        tracing::debug!("📨 event {} ({kind}) → {channel}", event.event_id);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockBroker, MockJobService};

    #[tokio::test]
    async fn test_channel_routing_with_audit_mirror() {
        let broker = Arc::new(MockBroker::up());
        let (controller, _rx) =
            DegradationController::new(Arc::new(MockJobService::up()), broker.clone());
        let publisher = EventPublisher::new(controller);

        publisher
            .publish(
                EventKind::Created,
                "alice",
                "t1",
                serde_json::json!({"title": "x"}),
            )
            .await
            .unwrap();
        publisher
            .publish(EventKind::ReminderDue, "alice", "t1", serde_json::json!({}))
            .await
            .unwrap();
        publisher
            .publish(EventKind::Generated, "alice", "t2", serde_json::json!({}))
            .await
            .unwrap();

        let published = broker.published.lock().unwrap();
        let channels: Vec<&str> = published.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(
            channels,
            vec![
                CHANNEL_LIFECYCLE,
                CHANNEL_AUDIT,
                CHANNEL_REMINDER,
                CHANNEL_AUDIT,
                CHANNEL_RECURRENCE,
                CHANNEL_AUDIT,
            ]
        );
    }

    #[tokio::test]
    async fn test_every_event_gets_fresh_id() {
        let broker = Arc::new(MockBroker::up());
        let (controller, _rx) =
            DegradationController::new(Arc::new(MockJobService::up()), broker);
        let publisher = EventPublisher::new(controller);

        let a = publisher
            .publish(EventKind::Updated, "alice", "t1", serde_json::json!({}))
            .await
            .unwrap();
        let b = publisher
            .publish(EventKind::Updated, "alice", "t1", serde_json::json!({}))
            .await
            .unwrap();
        assert_ne!(a.event_id, b.event_id);
    }
}
