//! Transport trait: one HTTP GET, no retries, no rate limiting.

use async_trait::async_trait;
use url::Url;

use crate::error::FetchResult;

/// Performs a single GET request.
///
/// Implementations map every failure onto [`crate::FetchError`]; they never
/// retry or sleep. Politeness and retry policy live in [`crate::Fetcher`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> FetchResult;

    /// Name of this transport (for logging).
    fn name(&self) -> &str {
        "transport"
    }
}
