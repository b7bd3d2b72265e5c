//! HTTP clients for the external job service and pub/sub broker.
//!
//! Both are thin wrappers: short timeout, fail fast with
//! `NestError::Upstream`, and let the degradation controller decide what
//! to do about it. An unconfigured endpoint fails immediately, which
//! drops the whole subsystem into local-fallback operation.

use async_trait::async_trait;
use std::time::Duration;

use tasknest_core::config::{BrokerConfig, JobServiceConfig};
use tasknest_core::{EventBroker, JobService, JobSpec, NestError, Result};

/// Client for the external time-triggered job service.
///
/// Scheduling the same job id again replaces the previous registration —
/// re-saves rely on that to move a trigger time.
pub struct HttpJobService {
    client: reqwest::Client,
    endpoint: String,
    callback_url: String,
    callback_secret: String,
}

impl HttpJobService {
    pub fn new(cfg: &JobServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            callback_url: cfg.callback_url.clone(),
            callback_secret: cfg.callback_secret.clone(),
        }
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn schedule(&self, job: &JobSpec) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(NestError::Upstream(
                "job service endpoint not configured".into(),
            ));
        }
        let resp = self
            .client
            .post(format!("{}/jobs", self.endpoint))
            .json(&serde_json::json!({
                "id": job.id,
                "fire_at": job.fire_at.to_rfc3339(),
                "callback": self.callback_url,
                "callback_secret": self.callback_secret,
                // Round-trips verbatim through the fire callback.
                "payload": job,
            }))
            .send()
            .await
            .map_err(|e| NestError::Upstream(format!("job service unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(NestError::Upstream(format!(
                "job service error {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(NestError::Upstream(
                "job service endpoint not configured".into(),
            ));
        }
        let resp = self
            .client
            .delete(format!("{}/jobs/{job_id}", self.endpoint))
            .send()
            .await
            .map_err(|e| NestError::Upstream(format!("job service unreachable: {e}")))?;
        // An unknown or already-fired job counts as cancelled.
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(NestError::Upstream(format!(
                "job service error {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Client for the external pub/sub broker.
pub struct HttpBroker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBroker {
    pub fn new(cfg: &BrokerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EventBroker for HttpBroker {
    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(NestError::Upstream("broker endpoint not configured".into()));
        }
        let resp = self
            .client
            .post(format!("{}/publish", self.endpoint))
            .json(&serde_json::json!({
                "channel": channel,
                "message": message,
            }))
            .send()
            .await
            .map_err(|e| NestError::Upstream(format!("broker unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(NestError::Upstream(format!(
                "broker error {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
