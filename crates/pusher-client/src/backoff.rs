//! Retry policy for the initial connection.
//!
//! [`ExponentialBackoff`] follows the "full jitter" strategy:
//! `delay = random(0, min(cap, base * 2^attempt))`.

use std::time::Duration;

use crate::config::RetryConfig;

/// Decides whether and when to retry a failed connection attempt.
pub trait RetryPolicy: Send {
    /// Delay before the next attempt, or `None` to give up.
    ///
    /// Called once after each failed attempt.
    fn next_delay(&mut self) -> Option<Duration>;

    /// Forget past failures after a successful attempt.
    fn reset(&mut self);
}

/// Exponential backoff calculator with full jitter and an attempt limit.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Base delay in milliseconds.
    base_ms: u64,
    /// Maximum delay cap in milliseconds.
    max_ms: u64,
    /// Total attempts allowed, including the first.
    max_attempts: u32,
    /// Failed attempts so far.
    failures: u32,
}

impl ExponentialBackoff {
    /// Create a backoff calculator.
    #[must_use]
    pub fn new(base_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            max_ms,
            max_attempts,
            failures: 0,
        }
    }

    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.initial_delay_ms,
            config.max_delay_ms,
            config.max_attempts,
        )
    }

    /// Failed attempts recorded since the last reset.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let capped = exp.min(self.max_ms);
        let jittered = if capped == 0 {
            0
        } else {
            fastrand::u64(0..=capped)
        };
        Duration::from_millis(jittered)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        let attempt = self.failures;
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_attempts {
            return None;
        }
        Some(self.jittered_delay(attempt))
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}
}
