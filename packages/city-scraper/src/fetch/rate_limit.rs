//! Per-host rate limiting.
//!
//! Each host gets its own governor token bucket with a burst of one, so two
//! requests to the same host are always at least the configured interval
//! apart. Hosts never share a bucket.

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;

use crate::types::config::FetchConfig;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Minimum-interval limiter keyed by host.
pub struct HostRateLimiter {
    default_interval: Duration,
    overrides: HashMap<String, Duration>,
    limiters: Mutex<HashMap<String, Option<Arc<DirectRateLimiter>>>>,
}

impl HostRateLimiter {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            overrides: HashMap::new(),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            default_interval: config.min_interval,
            overrides: config.host_intervals.clone(),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Override the interval for one host.
    pub fn with_host_interval(mut self, host: impl Into<String>, interval: Duration) -> Self {
        self.overrides.insert(host.into(), interval);
        self
    }

    pub fn interval_for(&self, host: &str) -> Duration {
        self.overrides
            .get(host)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Wait until a request to `host` is allowed.
    pub async fn until_ready(&self, host: &str) {
        if let Some(limiter) = self.limiter_for(host) {
            trace!(host = %host, "Waiting for rate limit permit");
            limiter.until_ready().await;
        }
    }

    /// `None` when the interval for `host` is zero (unlimited).
    fn limiter_for(&self, host: &str) -> Option<Arc<DirectRateLimiter>> {
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);

        limiters
            .entry(host.to_string())
            .or_insert_with(|| {
                Quota::with_period(self.interval_for(host))
                    .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(nonzero!(1u32)))))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_same_host_is_spaced() {
        let limiter = HostRateLimiter::new(Duration::from_millis(200));

        let start = Instant::now();
        for _ in 0..3 {
            limiter.until_ready("listings.example.com").await;
        }

        // First permit is immediate, the next two wait one interval each
        assert!(
            start.elapsed() >= Duration::from_millis(380),
            "Rate limiting not working: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_hosts_do_not_share_buckets() {
        let limiter = HostRateLimiter::new(Duration::from_secs(5));

        let start = Instant::now();
        limiter.until_ready("a.example.com").await;
        limiter.until_ready("b.example.com").await;
        limiter.until_ready("c.example.com").await;

        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_interval_is_unlimited() {
        let limiter = HostRateLimiter::new(Duration::from_secs(5))
            .with_host_interval("fast.example.com", Duration::ZERO);

        let start = Instant::now();
        for _ in 0..10 {
            limiter.until_ready("fast.example.com").await;
        }

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(limiter.interval_for("other.example.com"), Duration::from_secs(5));
    }
}
