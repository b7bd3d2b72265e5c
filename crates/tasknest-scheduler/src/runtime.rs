//! Scheduler runtime: wires the engines to the degradation controller
//! and runs the fired-job dispatcher.
//!
//! Fired jobs — from the external service's callback or a local fallback
//! timer — arrive as messages on one channel and are dispatched here,
//! never as a synchronous call stack from the scheduling site.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tasknest_core::{EventBroker, JobKind, JobService, JobSpec, NotificationSink, Result, Task};
use tasknest_store::TaskStore;

use crate::degrade::DegradationController;
use crate::events::EventPublisher;
use crate::reminders::ReminderScheduler;
use crate::recurring::RecurringEngine;

pub struct SchedulerRuntime {
    pub store: Arc<TaskStore>,
    pub controller: Arc<DegradationController>,
    pub publisher: Arc<EventPublisher>,
    pub reminders: Arc<ReminderScheduler>,
    pub recurring: Arc<RecurringEngine>,
}

impl SchedulerRuntime {
    /// Assemble the runtime. The returned receiver carries fired jobs
    /// and must be handed to [`SchedulerRuntime::spawn`].
    pub fn new(
        store: Arc<TaskStore>,
        jobs: Arc<dyn JobService>,
        broker: Arc<dyn EventBroker>,
        sink: Arc<dyn NotificationSink>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<JobSpec>) {
        let (controller, fired_rx) = DegradationController::new(jobs, broker);
        let publisher = Arc::new(EventPublisher::new(controller.clone()));
        let reminders = Arc::new(ReminderScheduler::new(
            store.clone(),
            controller.clone(),
            publisher.clone(),
            sink.clone(),
        ));
        let recurring = Arc::new(RecurringEngine::new(
            store.clone(),
            controller.clone(),
            publisher.clone(),
            reminders.clone(),
            sink,
        ));
        (
            Arc::new(Self {
                store,
                controller,
                publisher,
                reminders,
                recurring,
            }),
            fired_rx,
        )
    }

    /// Spawn the retry drain loop and the fired-job dispatcher.
    pub fn spawn(
        self: &Arc<Self>,
        mut fired_rx: mpsc::UnboundedReceiver<JobSpec>,
        retry_interval_secs: u64,
    ) -> JoinHandle<()> {
        self.controller.spawn_drain_loop(retry_interval_secs);
        let runtime = self.clone();
        tokio::spawn(async move {
            while let Some(job) = fired_rx.recv().await {
                let result = match &job.kind {
                    JobKind::Reminder { task_id } => {
                        runtime.reminders.on_reminder_fired(&job.owner, task_id).await
                    }
                    JobKind::Generation { task_id } => {
                        runtime
                            .recurring
                            .on_generation_fired(&job.owner, task_id)
                            .await
                    }
                };
                if let Err(e) = result {
                    tracing::error!("fired job {} failed: {e}", job.id);
                }
            }
        })
    }

    /// Inject a job fired by the external service (gateway callback).
    pub fn inject_fired(&self, job: JobSpec) {
        let _ = self.controller.fired_sender().send(job);
    }

    /// Hook for task create/update: (re)schedule reminder and
    /// generation jobs as the task's fields require.
    pub async fn on_task_saved(&self, task: &Task) -> Result<()> {
        self.reminders.on_task_saved(task).await?;
        self.recurring.on_task_saved(task).await
    }

    /// Hook for task completion: pending reminders are cancelled;
    /// recurring generation continues until deletion.
    pub async fn on_task_completed(&self, owner: &str, task_id: &str) -> Result<()> {
        self.reminders.on_task_closed(owner, task_id).await
    }

    /// Hook for task deletion: cascades to reminder and generation jobs.
    pub async fn on_task_deleted(&self, owner: &str, task_id: &str) -> Result<()> {
        self.reminders.on_task_closed(owner, task_id).await?;
        self.recurring.on_parent_deleted(owner, task_id).await
    }
}
