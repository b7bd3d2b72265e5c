//! Shared test doubles: controllable external services, a collecting
//! notification sink, and a fully wired runtime harness over the
//! in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tasknest_core::{
    EventBroker, JobService, JobSpec, NestError, Notification, NotificationSink, Result,
};
use tasknest_store::{MemoryKv, TaskStore};

use crate::runtime::SchedulerRuntime;

/// Job service double whose availability can be flipped mid-test.
pub struct MockJobService {
    pub available: AtomicBool,
    pub scheduled: Mutex<Vec<JobSpec>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl MockJobService {
    pub fn up() -> Self {
        Self {
            available: AtomicBool::new(true),
            scheduled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn down() -> Self {
        let svc = Self::up();
        svc.available.store(false, Ordering::SeqCst);
        svc
    }

    pub fn set_up(&self) {
        self.available.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobService for MockJobService {
    async fn schedule(&self, job: &JobSpec) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(NestError::Upstream("simulated scheduler outage".into()));
        }
        self.scheduled.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(NestError::Upstream("simulated scheduler outage".into()));
        }
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

/// Broker double recording every published message.
pub struct MockBroker {
    pub available: AtomicBool,
    pub published: Mutex<Vec<(String, String)>>,
}

impl MockBroker {
    pub fn up() -> Self {
        Self {
            available: AtomicBool::new(true),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn down() -> Self {
        let broker = Self::up();
        broker.available.store(false, Ordering::SeqCst);
        broker
    }

    pub fn set_up(&self) {
        self.available.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventBroker for MockBroker {
    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(NestError::Upstream("simulated broker outage".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }
}

/// Sink collecting (owner, notification) pairs.
#[derive(Default)]
pub struct CollectingSink {
    pub notes: Mutex<Vec<(String, Notification)>>,
}

impl NotificationSink for CollectingSink {
    fn push(&self, owner: &str, notification: Notification) {
        self.notes
            .lock()
            .unwrap()
            .push((owner.to_string(), notification));
    }
}

/// A wired runtime over in-memory everything.
pub struct Harness {
    pub store: Arc<TaskStore>,
    pub jobs: Arc<MockJobService>,
    pub broker: Arc<MockBroker>,
    pub sink: Arc<CollectingSink>,
    pub runtime: Arc<SchedulerRuntime>,
    fired_rx: Mutex<Option<mpsc::UnboundedReceiver<JobSpec>>>,
}

impl Harness {
    /// Start the dispatcher and drain loop (short retry interval).
    pub fn spawn(&self) {
        let rx = self
            .fired_rx
            .lock()
            .unwrap()
            .take()
            .expect("dispatcher already spawned");
        self.runtime.spawn(rx, 1);
    }
}

pub fn harness(jobs: MockJobService, broker: MockBroker) -> Harness {
    let store = Arc::new(TaskStore::new(Arc::new(MemoryKv::new())));
    let jobs = Arc::new(jobs);
    let broker = Arc::new(broker);
    let sink = Arc::new(CollectingSink::default());
    let (runtime, fired_rx) =
        SchedulerRuntime::new(store.clone(), jobs.clone(), broker.clone(), sink.clone());
    Harness {
        store,
        jobs,
        broker,
        sink,
        runtime,
        fired_rx: Mutex::new(Some(fired_rx)),
    }
}
