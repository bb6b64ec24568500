//! Configuration loading for the pipeline daemon
//!
//! Resolution priority, highest first:
//! 1. Explicit config file path (command line)
//! 2. `KYC_CONFIG` environment variable pointing at a TOML file
//! 3. Compiled defaults
//!
//! Connection strings can additionally be overridden per-leaf via
//! `KYC_DATABASE_URL` and `KYC_REDIS_URL`, so deployments can keep one
//! shared TOML file and vary only the endpoints.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Which event bus implementation the daemon wires up
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusMode {
    /// Broker-backed bus (requires `redis.url`)
    Broker,
    /// In-process mock bus (ordered buffers, no delivery)
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string for the durable tier
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://kyc-pipeline.db?mode=rwc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RedisConfig {
    /// Cache/broker endpoint; absent means in-memory cache + mock bus only
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub mode: BusMode,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { mode: BusMode::Broker }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for cached validations (seconds)
    pub validation_ttl_secs: u64,
    /// TTL for cached summaries (seconds)
    pub summary_ttl_secs: u64,
    /// TTL for conversational history (seconds)
    pub chat_ttl_secs: u64,
    /// TTL for anomaly alerts (seconds)
    pub alert_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            validation_ttl_secs: 3600,
            summary_ttl_secs: 3600,
            chat_ttl_secs: 7200,
            alert_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on any single durable-tier operation (milliseconds)
    pub op_timeout_ms: u64,
    /// How often degraded mode re-probes the durable tier (seconds)
    pub reprobe_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: 2000,
            reprobe_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Repeated-failure anomaly fires when a subject's failure count
    /// exceeds this inside the window
    pub failure_threshold: i64,
    pub failure_window_secs: u64,
    /// Event-rate anomaly fires when one event type's count exceeds this
    /// inside the window
    pub rate_threshold: i64,
    pub rate_window_secs: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 3600,
            rate_threshold: 100,
            rate_window_secs: 60,
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub bus: BusConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub anomaly: AnomalyConfig,
}

impl PipelineConfig {
    /// Resolve configuration from an optional explicit path, the
    /// `KYC_CONFIG` environment variable, or defaults.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Ok(env_path) = std::env::var("KYC_CONFIG") {
            Self::from_file(Path::new(&env_path))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("KYC_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("KYC_REDIS_URL") {
            self.redis.url = Some(url);
        }
    }
}
