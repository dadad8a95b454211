use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Bounded linear backoff for conditional appends.
///
/// Attempt `n` that loses its race waits `backoff_step_ms * n` before
/// attempt `n + 1`. After `max_attempts` lost races the append fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_step_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Used by tests and in-process stores.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_step_ms: 0,
        }
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.max_attempts == 0 {
            return Err(AuditError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Settings for the consumption loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Name of the shared log object inside the bucket.
    pub log_object: String,
    /// Deliveries requested per pull; also the per-batch concurrency.
    pub max_messages: usize,
    /// Idle wait after an empty pull or a failed pull.
    pub poll_interval_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            log_object: "audit/access.log".into(),
            max_messages: 10,
            poll_interval_ms: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> AuditResult<()> {
        if self.log_object.trim().is_empty() {
            return Err(AuditError::Config("log_object must not be empty".into()));
        }
        if self.max_messages == 0 {
            return Err(AuditError::Config("max_messages must be at least 1".into()));
        }
        self.retry.validate()
    }
}
