//! Retry policy: attempt cap plus exponential backoff with jitter.

use std::time::Duration;

use crate::error::FetchError;

/// How many times a target is attempted and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Default: 3.
    pub max_attempts: u32,

    /// Delay before the second attempt. Default: 500ms.
    pub base_delay: Duration,

    /// Upper bound for any single delay. Default: 30s.
    pub max_delay: Duration,

    /// Relative jitter in `[0.0, 1.0]`; the delay is scaled by a random factor
    /// in `[1 - jitter, 1 + jitter]`. Default: 0.2.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Policy with no waiting between attempts. Handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Whether another attempt is allowed after `attempts` attempts ended in `error`.
    pub fn should_retry(&self, attempts: u32, error: &FetchError) -> bool {
        error.is_retryable() && attempts < self.max_attempts
    }

    /// Un-jittered delay after the `attempt`-th failure (1-based):
    /// `min(base * 2^(attempt-1), max_delay)`.
    pub fn nominal_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Jittered delay after the `attempt`-th failure.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_backoff(attempt);
        if self.jitter <= 0.0 || nominal.is_zero() {
            return nominal;
        }

        let factor = 1.0 + self.jitter * (fastrand::f64() * 2.0 - 1.0);
        nominal.mul_f64(factor.max(0.0))
    }
}
