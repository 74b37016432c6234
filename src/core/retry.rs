//! Delivery retry schedule
//!
//! After the n-th failure a job waits `min(n * step, cap)` before its next
//! attempt. Once `max_retries` failures have accumulated the job is failed.

use crate::config::RetryConfig;
use chrono::Duration;

/// Linear, capped backoff between delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub step: Duration,
    pub cap: Duration,
}

/// What happens to a job after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after `delay`
    Retry { delay: Duration },
    /// Give up; the job becomes `failed`
    Exhausted,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, step: Duration, cap: Duration) -> Self {
        Self {
            max_retries,
            step,
            cap,
        }
    }

    /// Decision for a job whose failure count has just become `retry_count`
    pub fn next_after_failure(&self, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            return RetryDecision::Exhausted;
        }
        let delay = self.step * retry_count as i32;
        RetryDecision::Retry {
            delay: delay.min(self.cap),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::minutes(5), Duration::minutes(60))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::minutes(config.backoff_step_minutes as i64),
            Duration::minutes(config.backoff_cap_minutes as i64),
        )
    }
}
