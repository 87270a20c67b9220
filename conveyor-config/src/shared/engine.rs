use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

const fn default_workers() -> u16 {
    4
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_tick_interval_secs() -> u64 {
    30
}

const fn default_job_timeout_secs() -> u64 {
    3600
}

const fn default_batch_size() -> usize {
    50
}

/// Configuration for the pipeline execution engine.
///
/// Covers the executor worker pool, the scheduler tick cadence, the per-job
/// timeout, and how per-record failures are retried.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of executor workers claiming and running jobs in parallel.
    #[serde(default = "default_workers")]
    pub workers: u16,
    /// Milliseconds an idle worker waits before polling for pending jobs again.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Seconds between scheduler ticks evaluating pipeline cron schedules.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Maximum seconds a single job may run before it is failed with a timeout.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Number of records between progress flushes and cancellation checks.
    ///
    /// Cancellation latency is bounded by this value, not by record size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retry behavior for individual record load failures.
    #[serde(default)]
    pub record_retry: RecordRetryConfig,
}

impl EngineConfig {
    /// Validates engine configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::WorkersZero);
        }

        if self.batch_size == 0 {
            return Err(ValidationError::BatchSizeZero);
        }

        if self.job_timeout_secs == 0 {
            return Err(ValidationError::JobTimeoutZero);
        }

        if self.tick_interval_secs == 0 {
            return Err(ValidationError::TickIntervalZero);
        }

        Ok(())
    }

    /// Returns the idle poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the scheduler tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Returns the per-job timeout as a [`Duration`].
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            tick_interval_secs: default_tick_interval_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            batch_size: default_batch_size(),
            record_retry: RecordRetryConfig::default(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    200
}

/// Retry settings applied to a single failing record under the `retry` error policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordRetryConfig {
    /// Number of re-attempts after the initial failure before the record counts as an error.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff in milliseconds, doubled on every attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl RecordRetryConfig {
    /// Returns the backoff to apply before the given zero-based retry attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for RecordRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 4);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = EngineConfig {
            workers: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::WorkersZero)
        ));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = RecordRetryConfig {
            max_attempts: 3,
            backoff_ms: 100,
        };
        assert_eq!(retry.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.backoff_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.record_retry.max_attempts, 3);
    }
}
