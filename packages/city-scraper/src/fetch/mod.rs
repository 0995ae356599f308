//! Fetching: HTTP transport, per-host rate limiting and retry policy.
//!
//! - `HttpTransport` - reqwest-backed [`Transport`](crate::traits::transport::Transport)
//! - `HostRateLimiter` - minimum interval between requests to one host
//! - `RetryPolicy` - attempt cap and exponential backoff with jitter
//! - `Fetcher` - the run-scoped context combining the three

pub mod fetcher;
pub mod http;
pub mod rate_limit;
pub mod retry;

pub use fetcher::Fetcher;
pub use http::HttpTransport;
pub use rate_limit::HostRateLimiter;
pub use retry::RetryPolicy;
