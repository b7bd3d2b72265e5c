//! TaskNest configuration system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{NestError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NestConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jobs: JobServiceConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// HTTP server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8590
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Key-value store settings. An empty path means the default data dir.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub path: String,
}

impl StoreConfig {
    /// Resolve the database path (~/.tasknest/tasknest.db by default).
    pub fn db_path(&self) -> PathBuf {
        if self.path.is_empty() {
            NestConfig::data_dir().join("tasknest.db")
        } else {
            PathBuf::from(&self.path)
        }
    }
}

/// External time-triggered job service. An empty endpoint means the
/// service is unavailable and scheduling runs on local fallback timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobServiceConfig {
    #[serde(default)]
    pub endpoint: String,
    /// URL the job service calls back on fire (this gateway's
    /// /internal/jobs/fire route).
    #[serde(default)]
    pub callback_url: String,
    /// Shared secret the callback must present.
    #[serde(default)]
    pub callback_secret: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
    /// Fixed interval for draining the retry queue while degraded.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

fn default_upstream_timeout() -> u64 {
    3
}
fn default_retry_interval() -> u64 {
    15
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            callback_url: String::new(),
            callback_secret: String::new(),
            timeout_secs: default_upstream_timeout(),
            retry_interval_secs: default_retry_interval(),
        }
    }
}

/// External pub/sub broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

/// Static token → owner map standing in for the authentication
/// context provider. Owner ids are never read from request bodies.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl AuthConfig {
    /// Resolve a bearer token to an owner id.
    pub fn owner_for(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }
}

/// Live notification stream tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Max notifications queued per owner while no connection is active.
    #[serde(default = "default_offline_queue")]
    pub offline_queue: usize,
    /// Per-connection send buffer; a full buffer drops the connection.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

fn default_offline_queue() -> usize {
    64
}
fn default_connection_buffer() -> usize {
    32
}
fn default_heartbeat() -> u64 {
    25
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            offline_queue: default_offline_queue(),
            connection_buffer: default_connection_buffer(),
            heartbeat_secs: default_heartbeat(),
        }
    }
}

impl NestConfig {
    /// Load config from the default path (~/.tasknest/config.toml),
    /// falling back to defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NestError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| NestError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| NestError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Default config path, honoring the TASKNEST_CONFIG env var.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var("TASKNEST_CONFIG") {
            return PathBuf::from(p);
        }
        Self::data_dir().join("config.toml")
    }

    /// Data directory (~/.tasknest).
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tasknest")
    }
}
