//! reqwest-backed transport.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, ConfigResult, FetchError, FetchResult};
use crate::traits::transport::Transport;
use crate::types::{config::FetchConfig, fetch::FetchedContent, target::redact_url};

/// Plain HTTPS GET transport.
///
/// Sends the configured User-Agent and nothing else beyond an `Accept`
/// header; no cookies, no auth. Redirects are followed (up to 5).
///
/// # Example
///
/// ```rust,ignore
/// use city_scraper::{FetchConfig, HttpTransport};
///
/// let transport = HttpTransport::new(&FetchConfig::default())?;
/// let content = transport.get(&"https://example.com".parse()?).await?;
/// ```
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "http_client",
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// Use a pre-built client (custom TLS, proxies, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_error(url: &Url, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: redact_url(url),
            }
        } else {
            FetchError::Network {
                url: redact_url(url),
                message: error.without_url().to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> FetchResult {
        let response = self
            .client
            .get(url.clone())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/json;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: redact_url(url),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        debug!(status = status.as_u16(), bytes = body.len(), "HTTP response received");

        Ok(FetchedContent {
            url: url.clone(),
            body,
            content_type,
            status: status.as_u16(),
            fetched_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
