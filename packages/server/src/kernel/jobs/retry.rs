//! Bounded retry with exponential backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total claims a job chain may consume, counting the first one
    pub max_attempts: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows attempt number `attempts`:
    /// `base * 2^(attempts - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempts: i32) -> Duration {
        let exponent = attempts.saturating_sub(1).clamp(0, 31) as u32;
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// When the failed job should run again, or `None` once attempts are exhausted.
    pub fn next_run_at(&self, failed: &Job, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if failed.attempts >= self.max_attempts {
            return None;
        }
        let delay = chrono::Duration::from_std(self.backoff(failed.attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        Some(now + delay)
    }
}
