//! Retry scheduler: exponential backoff for failed assessments.
//!
//! Pure and deterministic. Given how many retries a record has already used and
//! its budget, decide whether it is exhausted or when the next attempt may start.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of consulting the retry policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// `retry_count` already at or past `max_retries`
    Exhausted,
    /// Requeue, eligible again at the given instant
    RetryAt(DateTime<Utc>),
}

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor applied per retry already used
    pub multiplier: f64,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Create a policy with a constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Delay before the retry that follows `retry_count` previous retries.
    ///
    /// `base * multiplier^retry_count`, capped at `max_delay`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let exp = self.multiplier.max(1.0).powi(retry_count.min(i32::MAX as u32) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Decide what happens after a failure, relative to `now`.
    pub fn decide(&self, retry_count: u32, max_retries: u32, now: DateTime<Utc>) -> RetryDecision {
        if retry_count >= max_retries {
            return RetryDecision::Exhausted;
        }
        let delay = chrono::Duration::from_std(self.delay_for(retry_count))
            .unwrap_or_else(|_| chrono::Duration::milliseconds(self.max_delay.as_millis() as i64));
        RetryDecision::RetryAt(now + delay)
    }
}
