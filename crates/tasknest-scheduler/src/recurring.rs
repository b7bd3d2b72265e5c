//! Recurring task engine: periodic generation of new task instances.
//!
//! Generation jobs are scheduled one-shot at the next occurrence and
//! rescheduled after each firing. When the process slept through one or
//! more firings, exactly one catch-up instance is generated on wake and
//! the schedule skips forward past the missed periods — a bounded
//! backlog, never one instance per missed period.

use std::sync::Arc;

use chrono::Utc;

use tasknest_core::traits::generation_job_id;
use tasknest_core::{
    EventKind, GenerationJob, JobSpec, NestError, Notification, NotificationSink, Result, Task,
};
use tasknest_store::TaskStore;

use crate::degrade::DegradationController;
use crate::events::EventPublisher;
use crate::recurrence::next_occurrence;
use crate::reminders::ReminderScheduler;

pub struct RecurringEngine {
    store: Arc<TaskStore>,
    controller: Arc<DegradationController>,
    publisher: Arc<EventPublisher>,
    reminders: Arc<ReminderScheduler>,
    sink: Arc<dyn NotificationSink>,
}

impl RecurringEngine {
    pub fn new(
        store: Arc<TaskStore>,
        controller: Arc<DegradationController>,
        publisher: Arc<EventPublisher>,
        reminders: Arc<ReminderScheduler>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            controller,
            publisher,
            reminders,
            sink,
        }
    }

    /// Hook: a task was created or updated. A recurrence pattern gets a
    /// generation job anchored to the task's due date; dropping the
    /// pattern on re-save cancels the job.
    pub async fn on_task_saved(&self, task: &Task) -> Result<()> {
        if !task.recurrence.is_recurring() {
            if self
                .store
                .get_generation_job(&task.owner, &task.id)?
                .is_some()
            {
                self.cancel_job(&task.owner, &task.id).await?;
            }
            return Ok(());
        }
        let Some(due) = task.due_at else {
            return Err(NestError::Validation(
                "recurring tasks require a due date".into(),
            ));
        };
        let job = GenerationJob {
            parent_id: task.id.clone(),
            pattern: task.recurrence,
            anchor: due,
            last_due: due,
        };
        let fire_at = next_occurrence(due, due, task.recurrence)?;
        self.store.put_generation_job(&task.owner, &job)?;
        self.controller
            .schedule(JobSpec::generation(&task.owner, &task.id, fire_at))
            .await;
        tracing::info!(
            "📅 generation job for {} ({}) — next occurrence {fire_at}",
            task.id,
            task.recurrence
        );
        Ok(())
    }

    /// Callback: the generation job fired. The parent is re-fetched; a
    /// missing parent self-cancels the job so orphans never fire forever.
    pub async fn on_generation_fired(&self, owner: &str, parent_id: &str) -> Result<()> {
        let parent = match self.store.get(owner, parent_id) {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "🧹 generation fired for missing task {parent_id} — cancelling orphaned job"
                );
                self.cancel_job(owner, parent_id).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let Some(mut job) = self.store.get_generation_job(owner, parent_id)? else {
            tracing::debug!("generation fired for {parent_id} with no job record — ignoring");
            return Ok(());
        };

        let next_due = next_occurrence(job.last_due, job.anchor, job.pattern)?;
        let instance = self.generate_instance(&parent, next_due).await?;
        tracing::info!(
            "✨ generated {} from {parent_id} — due {next_due}",
            instance.id
        );

        // Skip forward past any periods missed while asleep; the single
        // instance above is the whole catch-up.
        let now = Utc::now();
        let mut last = next_due;
        let mut fire_at = next_occurrence(last, job.anchor, job.pattern)?;
        let mut skipped = 0u32;
        while fire_at <= now {
            last = fire_at;
            fire_at = next_occurrence(last, job.anchor, job.pattern)?;
            skipped += 1;
        }
        if skipped > 0 {
            tracing::info!("skipped {skipped} missed period(s) for {parent_id} — single catch-up");
        }
        job.last_due = last;
        self.store.put_generation_job(owner, &job)?;
        self.controller
            .schedule(JobSpec::generation(owner, parent_id, fire_at))
            .await;
        Ok(())
    }

    /// Hook: the parent task was deleted. Future instances stop; already
    /// generated ones are independent tasks and are unaffected.
    pub async fn on_parent_deleted(&self, owner: &str, parent_id: &str) -> Result<()> {
        if self.store.get_generation_job(owner, parent_id)?.is_some() {
            self.cancel_job(owner, parent_id).await?;
            tracing::info!("generation job for {parent_id} cancelled");
        }
        Ok(())
    }

    /// Create one new instance copying the parent's fields, persist it,
    /// schedule its reminder, and publish the generated event.
    ///
    /// The instance carries the parent's recurrence value but does not
    /// get its own generation job — the parent's job stays the single
    /// source of future instances.
    async fn generate_instance(&self, parent: &Task, due: chrono::DateTime<Utc>) -> Result<Task> {
        let mut instance = Task::new(&parent.owner, &parent.title);
        instance.description = parent.description.clone();
        instance.priority = parent.priority;
        instance.tags = parent.tags.clone();
        instance.recurrence = parent.recurrence;
        instance.remind_before_mins = parent.remind_before_mins;
        instance.due_at = Some(due);
        self.store.save(&instance)?;
        self.reminders.on_task_saved(&instance).await?;

        let payload = serde_json::json!({
            "title": instance.title,
            "due_at": due,
            "generated_from": parent.id,
        });
        let event = self
            .publisher
            .publish(EventKind::Generated, &parent.owner, &instance.id, payload)
            .await?;
        let body = format!("\"{}\" regenerated — due {}", instance.title, due.to_rfc3339());
        self.sink.push(
            &parent.owner,
            Notification::from_event(&event, &instance.title, &body),
        );
        Ok(instance)
    }

    async fn cancel_job(&self, owner: &str, parent_id: &str) -> Result<()> {
        self.controller.cancel(&generation_job_id(parent_id)).await;
        self.store.delete_generation_job(owner, parent_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{harness, MockBroker, MockJobService};
    use chrono::{Duration, TimeZone};
    use tasknest_core::Recurrence;

    fn recurring_task(owner: &str, title: &str, due: chrono::DateTime<Utc>) -> Task {
        let mut task = Task::new(owner, title);
        task.due_at = Some(due);
        task.recurrence = Recurrence::Daily;
        task
    }

    #[tokio::test]
    async fn test_saved_recurring_task_schedules_generation() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let due = Utc::now() + Duration::hours(2);
        let task = recurring_task("alice", "standup", due);
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();

        let job = h
            .store
            .get_generation_job("alice", &task.id)
            .unwrap()
            .unwrap();
        assert_eq!(job.anchor, due);
        assert_eq!(job.last_due, due);
        let scheduled = h.jobs.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].fire_at, due + Duration::days(1));
    }

    #[tokio::test]
    async fn test_generation_creates_instance_with_copied_fields() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let due = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut task = recurring_task("alice", "water plants", due);
        task.tags = vec!["home".into()];
        task.priority = tasknest_core::Priority::High;
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();

        h.runtime
            .recurring
            .on_generation_fired("alice", &task.id)
            .await
            .unwrap();

        let tasks = h.store.list("alice").unwrap();
        assert_eq!(tasks.len(), 2);
        let instance = tasks.iter().find(|t| t.id != task.id).unwrap();
        assert_eq!(instance.title, "water plants");
        assert_eq!(instance.due_at.unwrap(), due + Duration::days(1));
        assert_eq!(instance.recurrence, Recurrence::Daily);
        assert_eq!(instance.tags, vec!["home".to_string()]);
        assert_eq!(instance.priority, tasknest_core::Priority::High);
        assert!(!instance.completed);
        assert_ne!(instance.id, task.id);
    }

    #[tokio::test]
    async fn test_missed_periods_generate_single_catch_up() {
        let h = harness(MockJobService::up(), MockBroker::up());
        // Due far in the past: many daily periods have elapsed.
        let due = Utc::now() - Duration::days(10);
        let task = recurring_task("alice", "daily log", due);
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();

        h.runtime
            .recurring
            .on_generation_fired("alice", &task.id)
            .await
            .unwrap();

        // Exactly one catch-up instance, not ten.
        let tasks = h.store.list("alice").unwrap();
        assert_eq!(tasks.len(), 2);

        // The next scheduled firing is in the future.
        let job = h
            .store
            .get_generation_job("alice", &task.id)
            .unwrap()
            .unwrap();
        let next = next_occurrence(job.last_due, job.anchor, job.pattern).unwrap();
        assert!(next > Utc::now());
    }

    #[tokio::test]
    async fn test_orphaned_job_self_cancels() {
        let h = harness(MockJobService::up(), MockBroker::up());
        h.runtime
            .recurring
            .on_generation_fired("alice", "ghost")
            .await
            .unwrap();
        assert!(h.store.list("alice").unwrap().is_empty());
        assert_eq!(h.jobs.cancelled.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_parent_deletion_stops_generation() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let task = recurring_task("alice", "newsletter", Utc::now() + Duration::hours(1));
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();

        h.store.delete("alice", &task.id).unwrap();
        h.runtime
            .recurring
            .on_parent_deleted("alice", &task.id)
            .await
            .unwrap();
        assert!(h.store.get_generation_job("alice", &task.id).unwrap().is_none());
        assert_eq!(h.jobs.cancelled.lock().unwrap().len(), 1);
        assert!(h.store.list("alice").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removing_recurrence_on_resave_cancels_job() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let mut task = recurring_task("alice", "was recurring", Utc::now() + Duration::hours(1));
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();
        assert!(h.store.get_generation_job("alice", &task.id).unwrap().is_some());

        task.recurrence = Recurrence::None;
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();
        assert!(h.store.get_generation_job("alice", &task.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generated_event_reaches_recurrence_channel() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let task = recurring_task("alice", "report", Utc::now() - Duration::hours(1));
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();
        h.runtime
            .recurring
            .on_generation_fired("alice", &task.id)
            .await
            .unwrap();

        let published = h.broker.published.lock().unwrap();
        assert!(published
            .iter()
            .any(|(c, m)| c == "task.recurrence" && m.contains("generated_from")));
        // Audit mirror carries the same event.
        assert!(published.iter().any(|(c, _)| c == "task.audit"));
    }

    #[tokio::test]
    async fn test_instance_with_reminder_offset_gets_reminder() {
        let h = harness(MockJobService::up(), MockBroker::up());
        let mut task = recurring_task("alice", "weekly sync", Utc::now() + Duration::minutes(30));
        task.recurrence = Recurrence::Weekly;
        task.remind_before_mins = Some(10);
        h.store.save(&task).unwrap();
        h.runtime.recurring.on_task_saved(&task).await.unwrap();

        h.runtime
            .recurring
            .on_generation_fired("alice", &task.id)
            .await
            .unwrap();
        let tasks = h.store.list("alice").unwrap();
        let instance = tasks.iter().find(|t| t.id != task.id).unwrap();
        // The fresh instance carries its own scheduled reminder.
        let state = h
            .store
            .get_reminder("alice", &instance.id)
            .unwrap()
            .unwrap();
        assert!(!state.sent);
    }
}
