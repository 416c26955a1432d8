//! Worker pool configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::poller::PollerConfig;
use crate::reliability::EscalationPolicy;

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Worker ID used in logs (generated if not provided)
    pub worker_id: String,

    /// Maximum concurrent task executions (slots)
    pub max_concurrency: usize,

    /// Idle backoff between empty claims
    pub poller: PollerConfig,

    /// Budget for a single handler invocation
    #[serde(with = "duration_millis")]
    pub execution_timeout: Duration,

    /// How long `stop` waits for in-flight tasks before force-failing them
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,

    /// Consecutive-failure escalation
    pub escalation: EscalationPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            max_concurrency: 4,
            poller: PollerConfig::default(),
            execution_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            escalation: EscalationPolicy::disabled(),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set poller configuration
    pub fn with_poller(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    /// Set the per-task execution timeout
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Stop the pool after `max` consecutive task failures
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.escalation = self.escalation.with_max_consecutive_failures(max);
        self
    }

    /// Check the configuration before the pool starts
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".into());
        }
        if self.execution_timeout.is_zero() {
            return Err("execution_timeout must be greater than zero".into());
        }
        if self.shutdown_timeout.is_zero() {
            return Err("shutdown_timeout must be greater than zero".into());
        }
        if self.poller.min_interval.is_zero() {
            return Err("idle interval must be greater than zero".into());
        }
        if self.poller.min_interval > self.poller.max_interval {
            return Err(format!(
                "idle interval {:?} exceeds its ceiling {:?}",
                self.poller.min_interval, self.poller.max_interval
            ));
        }
        Ok(())
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerPoolConfig::default();
        assert!(config.worker_id.starts_with("worker-"));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.execution_timeout, Duration::from_secs(30));
        assert!(!config.escalation.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerPoolConfig::new()
            .with_worker_id("test-worker")
            .with_max_concurrency(8)
            .with_execution_timeout(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(2))
            .with_max_consecutive_failures(3);

        assert_eq!(config.worker_id, "test-worker");
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.execution_timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.escalation.max_consecutive_failures, Some(3));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(WorkerPoolConfig::new()
            .with_max_concurrency(0)
            .validate()
            .is_err());
        assert!(WorkerPoolConfig::new()
            .with_execution_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(WorkerPoolConfig::new()
            .with_shutdown_timeout(Duration::ZERO)
            .validate()
            .is_err());

        let inverted = PollerConfig::new()
            .with_min_interval(Duration::from_secs(10))
            .with_max_interval(Duration::from_secs(1));
        let err = WorkerPoolConfig::new()
            .with_poller(inverted)
            .validate()
            .unwrap_err();
        assert!(err.contains("ceiling"));
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let config = WorkerPoolConfig::new().with_execution_timeout(Duration::from_millis(1500));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["execution_timeout"], 1500);

        let back: WorkerPoolConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
