//! Reminder scheduling: one-shot due-date reminders per task.

use std::sync::Arc;

use chrono::Utc;

use tasknest_core::traits::reminder_job_id;
use tasknest_core::{
    EventKind, JobSpec, Notification, NotificationSink, ReminderState, Result, Task,
};
use tasknest_store::TaskStore;

use crate::degrade::DegradationController;
use crate::events::EventPublisher;

pub struct ReminderScheduler {
    store: Arc<TaskStore>,
    controller: Arc<DegradationController>,
    publisher: Arc<EventPublisher>,
    sink: Arc<dyn NotificationSink>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<TaskStore>,
        controller: Arc<DegradationController>,
        publisher: Arc<EventPublisher>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            controller,
            publisher,
            sink,
        }
    }

    /// Hook: a task was created or updated. Re-saves move the trigger,
    /// so any existing schedule is dropped first. A trigger already in
    /// the past is delivered immediately rather than silently skipped.
    pub async fn on_task_saved(&self, task: &Task) -> Result<()> {
        if self.store.get_reminder(&task.owner, &task.id)?.is_some() {
            self.controller.cancel(&reminder_job_id(&task.id)).await;
            self.store.delete_reminder(&task.owner, &task.id)?;
        }
        if task.completed {
            return Ok(());
        }
        let Some(trigger) = task.reminder_trigger() else {
            return Ok(());
        };
        if trigger <= Utc::now() {
            tracing::info!("reminder for {} already due — delivering now", task.id);
            return self.deliver(task).await;
        }
        self.store.put_reminder(
            &task.owner,
            &ReminderState {
                task_id: task.id.clone(),
                trigger_at: trigger,
                sent: false,
            },
        )?;
        self.controller
            .schedule(JobSpec::reminder(&task.owner, &task.id, trigger))
            .await;
        tracing::debug!("⏰ reminder for {} scheduled at {trigger}", task.id);
        Ok(())
    }

    /// Hook: the task was completed or deleted. Cancelling a reminder
    /// that does not exist is a no-op, not an error.
    pub async fn on_task_closed(&self, owner: &str, task_id: &str) -> Result<()> {
        if self.store.get_reminder(owner, task_id)?.is_some() {
            self.controller.cancel(&reminder_job_id(task_id)).await;
            self.store.delete_reminder(owner, task_id)?;
            tracing::debug!("reminder for {task_id} cancelled");
        }
        Ok(())
    }

    /// Callback: the reminder job fired. The task is re-fetched to guard
    /// against completion/deletion races since scheduling, and the
    /// `sent` flag makes duplicate firings (external at-least-once plus
    /// local fallback) a no-op.
    pub async fn on_reminder_fired(&self, owner: &str, task_id: &str) -> Result<()> {
        let task = match self.store.get(owner, task_id) {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                tracing::info!("reminder fired for missing task {task_id} — discarding");
                self.store.delete_reminder(owner, task_id)?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if task.completed {
            tracing::info!("reminder fired for completed task {task_id} — discarding");
            self.store.delete_reminder(owner, task_id)?;
            return Ok(());
        }
        if let Some(state) = self.store.get_reminder(owner, task_id)?
            && state.sent
        {
            tracing::debug!("reminder for {task_id} already sent — duplicate firing ignored");
            return Ok(());
        }
        self.deliver(&task).await
    }

    /// Publish the reminder-due event, push the notification to the
    /// owner's live stream, and mark the reminder sent.
    async fn deliver(&self, task: &Task) -> Result<()> {
        let payload = serde_json::json!({
            "title": task.title,
            "due_at": task.due_at,
        });
        let event = self
            .publisher
            .publish(EventKind::ReminderDue, &task.owner, &task.id, payload)
            .await?;
        let body = match task.due_at {
            Some(due) => format!("\"{}\" is due at {}", task.title, due.to_rfc3339()),
            None => format!("\"{}\" is due", task.title),
        };
        self.sink
            .push(&task.owner, Notification::from_event(&event, &task.title, &body));
        self.store.put_reminder(
            &task.owner,
            &ReminderState {
                task_id: task.id.clone(),
                trigger_at: task.reminder_trigger().unwrap_or(event.at),
                sent: true,
            },
        )?;
        tracing::info!("🔔 reminder delivered for {} ({})", task.id, task.owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{harness, CollectingSink, MockBroker, MockJobService};
    use chrono::Duration;

    fn due_task(owner: &str, title: &str, due_in_ms: i64, offset_mins: u32) -> Task {
        let mut task = Task::new(owner, title);
        task.due_at = Some(Utc::now() + Duration::milliseconds(due_in_ms));
        task.remind_before_mins = Some(offset_mins);
        task
    }

    #[tokio::test]
    async fn test_schedule_and_cancel_on_completion() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let task = due_task("alice", "report", 600_000, 5);
        h.runtime.reminders.on_task_saved(&task).await.unwrap();
        assert!(h.store.get_reminder("alice", &task.id).unwrap().is_some());
        assert_eq!(h.jobs.scheduled.lock().unwrap().len(), 1);

        h.runtime
            .reminders
            .on_task_closed("alice", &task.id)
            .await
            .unwrap();
        assert!(h.store.get_reminder("alice", &task.id).unwrap().is_none());
        assert_eq!(h.jobs.cancelled.lock().unwrap().len(), 1);
        // Cancelling again is a clean no-op with no second external call.
        h.runtime
            .reminders
            .on_task_closed("alice", &task.id)
            .await
            .unwrap();
        assert_eq!(h.jobs.cancelled.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_past_trigger_fires_immediately() {
        let h = harness(MockJobService::up(), MockBroker::up());
        // Due one minute from now with a ten-minute offset: trigger is
        // in the past but the save is valid at fire time.
        let task = due_task("alice", "almost due", 60_000, 10);
        h.runtime.reminders.on_task_saved(&task).await.unwrap();

        let notes = h.sink.notes.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "alice");
        assert!(notes[0].1.body.contains("almost due"));
        drop(notes);
        assert!(h.store.get_reminder("alice", &task.id).unwrap().unwrap().sent);
    }

    #[tokio::test]
    async fn test_fired_reminder_is_idempotent() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let task = due_task("alice", "standup", 600_000, 5);
        h.runtime.reminders.on_task_saved(&task).await.unwrap();

        h.runtime
            .reminders
            .on_reminder_fired("alice", &task.id)
            .await
            .unwrap();
        h.runtime
            .reminders
            .on_reminder_fired("alice", &task.id)
            .await
            .unwrap();

        // Second firing is a no-op: one notification, one stream event
        // pair (reminder channel + audit mirror).
        assert_eq!(h.sink.notes.lock().unwrap().len(), 1);
        assert_eq!(h.broker.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fired_for_missing_or_completed_task_discards() {
        let h = harness(MockJobService::up(), MockBroker::up());
        h.runtime
            .reminders
            .on_reminder_fired("alice", "ghost")
            .await
            .unwrap();
        assert!(h.sink.notes.lock().unwrap().is_empty());

        let mut task = due_task("alice", "done already", 600_000, 5);
        h.runtime.reminders.on_task_saved(&task).await.unwrap();
        task.completed = true;
        h.store.save(&task).unwrap();
        h.runtime
            .reminders
            .on_reminder_fired("alice", &task.id)
            .await
            .unwrap();
        assert!(h.sink.notes.lock().unwrap().is_empty());
        assert!(h.store.get_reminder("alice", &task.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_degraded_scheduling_delivers_via_fallback() {
        let h = harness(MockJobService::down(), MockBroker::up());
        h.spawn();

        // Due shortly; trigger lands ~150ms out via the local timer.
        let mut task = Task::new("alice", "degraded reminder");
        task.due_at = Some(Utc::now() + Duration::milliseconds(150));
        task.remind_before_mins = Some(0);
        h.runtime.reminders.on_task_saved(&task).await.unwrap();
        assert!(!h.runtime.controller.is_healthy());

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        let notes = h.sink.notes.lock().unwrap();
        assert_eq!(notes.len(), 1, "local fallback should have delivered");
        assert!(notes[0].1.title.contains("degraded reminder"));
    }

    #[tokio::test]
    async fn test_resave_moves_trigger() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let mut task = due_task("alice", "moving target", 600_000, 5);
        h.runtime.reminders.on_task_saved(&task).await.unwrap();
        task.due_at = Some(Utc::now() + Duration::milliseconds(1_200_000));
        h.runtime.reminders.on_task_saved(&task).await.unwrap();

        // Old job cancelled, new one scheduled.
        assert_eq!(h.jobs.cancelled.lock().unwrap().len(), 1);
        assert_eq!(h.jobs.scheduled.lock().unwrap().len(), 2);
        let state = h.store.get_reminder("alice", &task.id).unwrap().unwrap();
        assert!(!state.sent);
    }

    #[tokio::test]
    async fn test_sink_type_is_object_safe() {
        // NotificationSink is used as a trait object across crates.
        let sink: Arc<dyn NotificationSink> = Arc::new(CollectingSink::default());
        sink.push(
            "alice",
            Notification {
                event_id: "e".into(),
                kind: EventKind::ReminderDue,
                title: "t".into(),
                body: "b".into(),
                at: Utc::now(),
            },
        );
    }
}
