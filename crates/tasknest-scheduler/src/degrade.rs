//! Degradation controller — health tracking, retry queue, and local
//! fallback timers over the two external service clients.
//!
//! Every outbound call is attempted against the external service first.
//! On failure the operation lands in an in-process retry queue and the
//! controller flips to `Degraded`; a background loop drains the queue on
//! a fixed interval and the first success flips back to `Healthy`.
//! Failed scheduling additionally arms an in-process timer keyed by the
//! same job id, so time-triggered behavior still happens while the
//! external scheduler is down — at the cost of not surviving a process
//! restart while degraded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tasknest_core::{EventBroker, JobService, JobSpec};

/// External infrastructure health as observed from this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
}

/// An operation waiting for the external infrastructure to come back.
#[derive(Debug, Clone)]
enum PendingOp {
    Schedule(JobSpec),
    Cancel { job_id: String },
    Publish { channel: String, message: String },
}

impl PendingOp {
    fn job_id(&self) -> Option<&str> {
        match self {
            PendingOp::Schedule(job) => Some(&job.id),
            PendingOp::Cancel { job_id } => Some(job_id),
            PendingOp::Publish { .. } => None,
        }
    }
}

/// Per-feature availability snapshot for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureAvailability {
    pub health: Health,
    /// "live" or "queued".
    pub events: &'static str,
    /// "external" or "local-fallback".
    pub reminders: &'static str,
    pub queued_ops: usize,
    pub local_timers: usize,
}

pub struct DegradationController {
    jobs: Arc<dyn JobService>,
    broker: Arc<dyn EventBroker>,
    health: Mutex<Health>,
    queue: Mutex<VecDeque<PendingOp>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    fired_tx: mpsc::UnboundedSender<JobSpec>,
}

impl DegradationController {
    /// Build a controller and the receiving end of the fired-job channel.
    /// Fired jobs — whether from the external callback or a local
    /// fallback timer — all arrive on that one channel.
    pub fn new(
        jobs: Arc<dyn JobService>,
        broker: Arc<dyn EventBroker>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<JobSpec>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let controller = Arc::new(Self {
            jobs,
            broker,
            health: Mutex::new(Health::Healthy),
            queue: Mutex::new(VecDeque::new()),
            timers: Mutex::new(HashMap::new()),
            fired_tx,
        });
        (controller, fired_rx)
    }

    /// Sender used by the gateway's internal callback route to inject
    /// jobs fired by the external service.
    pub fn fired_sender(&self) -> mpsc::UnboundedSender<JobSpec> {
        self.fired_tx.clone()
    }

    pub fn is_healthy(&self) -> bool {
        *self.health.lock().unwrap() == Health::Healthy
    }

    pub fn availability(&self) -> FeatureAvailability {
        let queue = self.queue.lock().unwrap();
        let publish_queued = queue
            .iter()
            .any(|op| matches!(op, PendingOp::Publish { .. }));
        let timers = self.timers.lock().unwrap().len();
        FeatureAvailability {
            health: *self.health.lock().unwrap(),
            events: if publish_queued { "queued" } else { "live" },
            reminders: if timers > 0 { "local-fallback" } else { "external" },
            queued_ops: queue.len(),
            local_timers: timers,
        }
    }

    /// Schedule a job. On external failure the op is queued for retry
    /// and a local fallback timer takes over the fire time.
    pub async fn schedule(self: &Arc<Self>, job: JobSpec) {
        match self.jobs.schedule(&job).await {
            Ok(()) => {
                self.mark_success();
                self.disarm(&job.id);
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ external schedule failed for {} ({e}) — arming local fallback timer",
                    job.id
                );
                self.mark_failure();
                self.queue
                    .lock()
                    .unwrap()
                    .push_back(PendingOp::Schedule(job.clone()));
                self.arm_fallback(job);
            }
        }
    }

    /// Cancel a job everywhere: local timer, retry queue, external
    /// service. Cancelling something that no longer exists is a no-op.
    pub async fn cancel(self: &Arc<Self>, job_id: &str) {
        self.disarm(job_id);
        let removed_schedule = {
            let mut queue = self.queue.lock().unwrap();
            let before = queue.len();
            queue.retain(|op| op.job_id() != Some(job_id));
            before != queue.len()
        };
        match self.jobs.cancel(job_id).await {
            Ok(()) => self.mark_success(),
            Err(e) => {
                self.mark_failure();
                // If the schedule op never left the queue, the external
                // service has nothing to cancel.
                if !removed_schedule {
                    tracing::warn!("⚠️ external cancel failed for {job_id} ({e}) — queued");
                    self.queue.lock().unwrap().push_back(PendingOp::Cancel {
                        job_id: job_id.to_string(),
                    });
                }
            }
        }
    }

    /// Publish a broker message, queueing it for retry on failure.
    /// Callers never see infrastructure errors from this path.
    pub async fn publish(&self, channel: &str, message: &str) {
        match self.broker.publish(channel, message).await {
            Ok(()) => self.mark_success(),
            Err(e) => {
                tracing::warn!("⚠️ publish to {channel} failed ({e}) — queued for retry");
                self.mark_failure();
                self.queue.lock().unwrap().push_back(PendingOp::Publish {
                    channel: channel.to_string(),
                    message: message.to_string(),
                });
            }
        }
    }

    /// Spawn the background loop that drains the retry queue on a fixed
    /// interval.
    pub fn spawn_drain_loop(self: &Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                controller.drain_once().await;
            }
        })
    }

    /// One drain pass: re-attempt queued ops in order, stopping at the
    /// first op that still fails (order within the queue is preserved).
    pub async fn drain_once(self: &Arc<Self>) {
        loop {
            let op = { self.queue.lock().unwrap().pop_front() };
            let Some(op) = op else { break };
            let result = match &op {
                PendingOp::Schedule(job) => self.jobs.schedule(job).await,
                PendingOp::Cancel { job_id } => self.jobs.cancel(job_id).await,
                PendingOp::Publish { channel, message } => {
                    self.broker.publish(channel, message).await
                }
            };
            match result {
                Ok(()) => {
                    self.mark_success();
                    // The external service owns this job again.
                    if let PendingOp::Schedule(job) = &op {
                        self.disarm(&job.id);
                    }
                }
                Err(e) => {
                    tracing::debug!("retry still failing: {e}");
                    self.mark_failure();
                    self.queue.lock().unwrap().push_front(op);
                    break;
                }
            }
        }
    }

    fn mark_success(&self) {
        let mut health = self.health.lock().unwrap();
        if *health == Health::Degraded {
            *health = Health::Healthy;
            tracing::info!("✅ external scheduling/event infrastructure recovered — healthy");
        }
    }

    fn mark_failure(&self) {
        let mut health = self.health.lock().unwrap();
        if *health == Health::Healthy {
            *health = Health::Degraded;
            tracing::warn!("⚠️ external scheduling/event infrastructure unreachable — degraded");
        }
    }

    /// Arm (or re-arm) the in-process timer for a job.
    fn arm_fallback(self: &Arc<Self>, job: JobSpec) {
        self.disarm(&job.id);
        let id = job.id.clone();
        let tx = self.fired_tx.clone();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let delay = (job.fire_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
            tracing::info!("⏰ local fallback timer fired for {}", job.id);
            if let Some(controller) = weak.upgrade() {
                controller.timers.lock().unwrap().remove(&job.id);
            }
            let _ = tx.send(job);
        });
        self.timers.lock().unwrap().insert(id, handle);
    }

    fn disarm(&self, job_id: &str) {
        if let Some(handle) = self.timers.lock().unwrap().remove(job_id) {
            handle.abort();
        }
    }
}
