//! The fetcher: rate-limited attempts with retry bookkeeping.

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ConfigResult, FetchError, FetchResult};
use crate::fetch::{http::HttpTransport, rate_limit::HostRateLimiter, retry::RetryPolicy};
use crate::traits::transport::Transport;
use crate::types::{config::FetchConfig, target::Target};

/// Run-scoped fetch context.
///
/// Owns the transport (and with it the connection pool), the per-host rate
/// limiter and the retry policy. Created at run start and dropped at run
/// end; nothing here is global.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limiter: HostRateLimiter,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, config: &FetchConfig) -> Self {
        Self {
            transport,
            limiter: HostRateLimiter::from_config(config),
            policy: config.retry.clone(),
        }
    }

    /// Fetcher backed by a real HTTP client.
    pub fn http(config: &FetchConfig) -> ConfigResult<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Make exactly one attempt at `target`.
    ///
    /// Waits for the host's rate-limit permit, increments the attempt
    /// counter and, after a retryable failure with attempts remaining, sets
    /// the target's next-allowed time from the backoff policy. Never sleeps
    /// on the backoff itself.
    pub async fn attempt(&self, target: &mut Target) -> FetchResult {
        self.limiter.until_ready(&target.host()).await;

        target.retry.attempts += 1;
        let attempt = target.retry.attempts;
        let display_url = target.display_url();

        debug!(
            target_id = %target.id,
            url = %display_url,
            attempt,
            max_attempts = self.policy.max_attempts,
            transport = self.transport.name(),
            "Fetching"
        );

        // Transports may echo the raw URL, keys included
        let result = self
            .transport
            .get(&target.url)
            .await
            .map_err(|e| e.with_display_url(target.url.as_str(), &display_url));

        match &result {
            Ok(content) => {
                target.retry.next_allowed_at = None;
                debug!(
                    target_id = %target.id,
                    status = content.status,
                    bytes = content.len(),
                    "Fetch succeeded"
                );
            }
            Err(error) if self.policy.should_retry(attempt, error) => {
                let delay = self.policy.backoff(attempt);
                target.retry.next_allowed_at = Some(Instant::now() + delay);
                warn!(
                    target_id = %target.id,
                    url = %display_url,
                    attempt,
                    error = error.kind(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Fetch failed, will retry"
                );
            }
            Err(error) => {
                target.retry.next_allowed_at = None;
                warn!(
                    target_id = %target.id,
                    url = %display_url,
                    attempt,
                    error = %error,
                    "Fetch failed terminally"
                );
            }
        }

        result
    }

    /// Whether `target` may be attempted again after `error`.
    pub fn can_retry(&self, target: &Target, error: &FetchError) -> bool {
        self.policy.should_retry(target.retry.attempts, error)
    }

    /// Attempt `target` until success, a terminal error or the attempt cap,
    /// sleeping out the backoff in between.
    pub async fn fetch(&self, target: &mut Target) -> FetchResult {
        loop {
            if let Some(at) = target.retry.next_allowed_at {
                tokio::time::sleep_until(at).await;
            }

            match self.attempt(target).await {
                Ok(content) => return Ok(content),
                Err(error) if self.can_retry(target, &error) => continue,
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockResponse, MockTransport};
    use crate::types::target::SourceKind;
    use std::time::Duration;
    use url::Url;

    const URL: &str = "https://listings.example.com/austin?page=1";

    fn fast_config(max_attempts: u32) -> FetchConfig {
        FetchConfig::new()
            .with_min_interval(Duration::ZERO)
            .with_retry(RetryPolicy::immediate(max_attempts))
    }

    fn target() -> Target {
        Target::new(0, Url::parse(URL).unwrap(), SourceKind::Property)
    }

    #[tokio::test]
    async fn test_network_errors_stop_at_max_attempts() {
        let mock = MockTransport::new()
            .with_response(URL, MockResponse::network_error("connection reset"));
        let fetcher = Fetcher::new(Arc::new(mock.clone()), &fast_config(3));

        let mut target = target();
        let result = fetcher.fetch(&mut target).await;

        assert!(matches!(result, Err(FetchError::Network { .. })));
        assert_eq!(target.retry.attempts, 3);
        assert_eq!(mock.call_count(URL), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mock = MockTransport::new().with_response(URL, MockResponse::status(404));
        let fetcher = Fetcher::new(Arc::new(mock.clone()), &fast_config(3));

        let mut target = target();
        let result = fetcher.fetch(&mut target).await;

        assert!(matches!(result, Err(FetchError::Http { status: 404, .. })));
        assert_eq!(target.retry.attempts, 1);
        assert_eq!(mock.call_count(URL), 1);
    }

    #[tokio::test]
    async fn test_server_errors_then_success() {
        let mock = MockTransport::new().with_sequence(
            URL,
            vec![
                MockResponse::status(500),
                MockResponse::status(500),
                MockResponse::html("<div data-listings></div>"),
            ],
        );
        let fetcher = Fetcher::new(Arc::new(mock.clone()), &fast_config(3));

        let mut target = target();
        let content = fetcher.fetch(&mut target).await.unwrap();

        assert_eq!(content.status, 200);
        assert_eq!(target.retry.attempts, 3);
        assert!(target.retry.next_allowed_at.is_none());
    }

    #[tokio::test]
    async fn test_errors_carry_redacted_url() {
        let weather = "https://api.openweathermap.org/data/2.5/weather?q=Austin&appid=SUPERSECRET123";
        let air = "https://api.openweathermap.org/data/2.5/air_pollution?lat=1&lon=2&appid=SUPERSECRET123";
        let mock = MockTransport::new()
            .with_response(weather, MockResponse::status(401))
            .with_response(air, MockResponse::network_error(format!("reset by {air}")));
        let fetcher = Fetcher::new(Arc::new(mock), &fast_config(1));

        for url in [weather, air] {
            let mut target = Target::new(1, Url::parse(url).unwrap(), SourceKind::Environment);
            let err = fetcher.fetch(&mut target).await.unwrap_err();

            assert!(err.url().ends_with("appid=***"));
            assert!(!err.to_string().contains("SUPERSECRET123"), "{err}");
        }
    }

    #[tokio::test]
    async fn test_attempt_schedules_backoff() {
        let mock = MockTransport::new().with_response(URL, MockResponse::Timeout);
        let config = FetchConfig::new()
            .with_min_interval(Duration::ZERO)
            .with_retry(
                RetryPolicy::new()
                    .with_base_delay(Duration::from_secs(2))
                    .with_jitter(0.0),
            );
        let fetcher = Fetcher::new(Arc::new(mock), &config);

        let mut target = target();
        let before = Instant::now();
        let err = fetcher.attempt(&mut target).await.unwrap_err();

        assert!(fetcher.can_retry(&target, &err));
        let next = target.retry.next_allowed_at.expect("backoff scheduled");
        assert!(next >= before + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_attempts_to_one_host_respect_interval() {
        let mock = MockTransport::new()
            .with_response(URL, MockResponse::html("<div data-listings></div>"));
        let config = FetchConfig::new()
            .with_min_interval(Duration::from_millis(150))
            .with_retry(RetryPolicy::immediate(1));
        let fetcher = Fetcher::new(Arc::new(mock), &config);

        let start = std::time::Instant::now();
        for _ in 0..3 {
            fetcher.attempt(&mut target()).await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(280));
    }
}
