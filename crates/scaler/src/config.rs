//! Scaler configuration

use anyhow::{ensure, Result};
use scaler_lib::retry::BackoffPolicy;
use scaler_lib::RolloverConfig;
use serde::Deserialize;
use std::time::Duration;

/// Scaler configuration, read from `SCALER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Namespace to watch; all namespaces when unset
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Field manager recorded on every write
    #[serde(default = "default_field_manager")]
    pub field_manager: String,

    /// Readiness poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,

    /// Re-read and retry limit for conflicting service updates
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,

    /// Attempts per API call for transient failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_initial_backoff")]
    pub retry_initial_backoff_ms: u64,

    #[serde(default = "default_retry_max_backoff")]
    pub retry_max_backoff_ms: u64,

    /// Requeue delay while the catalog or service is missing
    #[serde(default = "default_missing_dependency_requeue")]
    pub missing_dependency_requeue_secs: u64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_field_manager() -> String {
    "hybrid-scaler".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_settle_delay() -> u64 {
    5
}

fn default_readiness_timeout() -> u64 {
    300
}

fn default_conflict_retries() -> u32 {
    3
}

fn default_retry_attempts() -> u32 {
    4
}

fn default_retry_initial_backoff() -> u64 {
    200
}

fn default_retry_max_backoff() -> u64 {
    5000
}

fn default_missing_dependency_requeue() -> u64 {
    30
}

impl ScalerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("SCALER"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?;

        let loaded: ScalerConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be positive");
        ensure!(self.readiness_timeout_secs > 0, "readiness_timeout_secs must be positive");
        ensure!(self.retry_attempts > 0, "retry_attempts must be at least 1");
        ensure!(
            self.retry_initial_backoff_ms <= self.retry_max_backoff_ms,
            "retry_initial_backoff_ms must not exceed retry_max_backoff_ms"
        );
        ensure!(!self.field_manager.is_empty(), "field_manager must not be empty");
        Ok(())
    }

    pub fn rollover_config(&self) -> RolloverConfig {
        RolloverConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
            conflict_retries: self.conflict_retries,
            backoff: BackoffPolicy {
                max_attempts: self.retry_attempts,
                initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
                max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            },
            missing_dependency_requeue: Duration::from_secs(self.missing_dependency_requeue_secs),
        }
    }
}
