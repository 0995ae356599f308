//! Configuration types for fetching and whole scrape runs.

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::fetch::retry::RetryPolicy;
use crate::types::target::SourceKind;

/// Default User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "city-scraper/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/city-data/city-scraper)"
);

/// Politeness and resilience settings for the fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-Agent header value
    pub user_agent: String,

    /// Per-request timeout. Default: 30s.
    pub timeout: Duration,

    /// Minimum interval between two requests to the same host. Default: 1s.
    pub min_interval: Duration,

    /// Per-host interval overrides, keyed by host (with port if non-default)
    pub host_intervals: HashMap<String, Duration>,

    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            min_interval: Duration::from_secs(1),
            host_intervals: HashMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Override the request interval for one host.
    pub fn with_host_interval(mut self, host: impl Into<String>, interval: Duration) -> Self {
        self.host_intervals.insert(host.into(), interval);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Interval that applies to `host`.
    pub fn interval_for(&self, host: &str) -> Duration {
        self.host_intervals
            .get(host)
            .copied()
            .unwrap_or(self.min_interval)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Missing { field: "user_agent" });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be greater than zero".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid {
                field: "retry",
                reason: "base delay exceeds max delay".into(),
            });
        }
        Ok(())
    }
}

/// A family of targets described by a URL template.
///
/// Supported placeholders: `{city}`, `{state}`, `{page}`, `{api_key}`, plus
/// any variable set on [`ScrapeConfig::vars`] (e.g. `{lat}`, `{lon}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub url_template: String,

    /// Number of pages to expand `{page}` into (1-based). Default: 1.
    pub pages: u32,
}

impl SourceSpec {
    pub fn new(kind: SourceKind, url_template: impl Into<String>) -> Self {
        Self {
            kind,
            url_template: url_template.into(),
            pages: 1,
        }
    }

    pub fn property(url_template: impl Into<String>) -> Self {
        Self::new(SourceKind::Property, url_template)
    }

    pub fn environment(url_template: impl Into<String>) -> Self {
        Self::new(SourceKind::Environment, url_template)
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    /// OpenWeatherMap current weather for the configured city (imperial units).
    pub fn openweather_current() -> Self {
        Self::environment(
            "https://api.openweathermap.org/data/2.5/weather?q={city},{state},US&appid={api_key}&units=imperial",
        )
    }

    /// OpenWeatherMap air pollution; needs `lat` and `lon` variables.
    pub fn openweather_air_quality() -> Self {
        Self::environment(
            "https://api.openweathermap.org/data/2.5/air_pollution?lat={lat}&lon={lon}&appid={api_key}",
        )
    }
}

/// CSS selectors describing listing markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    /// Container that must exist for the page to be recognized
    pub root: String,

    /// One element per listing, relative to `root`
    pub listing: String,

    /// Attribute on the listing element holding the property id
    pub key_attr: String,

    /// Field elements, relative to the listing
    pub field: String,

    /// Attribute on a field element holding the field name
    pub field_attr: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            root: "[data-listings]".into(),
            listing: "[data-property-id]".into(),
            key_attr: "data-property-id".into(),
            field: "[data-field]".into(),
            field_attr: "data-field".into(),
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub city: String,

    /// Two-letter state code, e.g. `TX`
    pub state: String,

    /// Directory that receives exported files
    pub output_dir: PathBuf,

    pub fetch: FetchConfig,

    /// Worker pool size (hosts processed in parallel). Default: 4.
    pub concurrency: usize,

    /// Flush a checkpoint after every N ingested targets
    pub checkpoint_every: Option<usize>,

    pub sources: Vec<SourceSpec>,

    /// Extra template variables
    pub vars: IndexMap<String, String>,

    /// Substituted into `{api_key}`; redacted in Debug output
    pub api_key: Option<SecretString>,

    pub selectors: ListingSelectors,

    /// Also write the property rows joined with environment columns
    pub write_combined: bool,
}

impl ScrapeConfig {
    pub fn new(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
            output_dir: PathBuf::from("data"),
            fetch: FetchConfig::default(),
            concurrency: 4,
            checkpoint_every: None,
            sources: Vec::new(),
            vars: IndexMap::new(),
            api_key: None,
            selectors: ListingSelectors::default(),
            write_combined: true,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_checkpoint_every(mut self, targets: usize) -> Self {
        self.checkpoint_every = Some(targets);
        self
    }

    pub fn with_source(mut self, source: SourceSpec) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_selectors(mut self, selectors: ListingSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_combined(mut self, enabled: bool) -> Self {
        self.write_combined = enabled;
        self
    }

    /// Reject unusable settings before any network activity.
    ///
    /// Target URLs are checked separately when targets are planned.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.city.trim().is_empty() {
            return Err(ConfigError::Missing { field: "city" });
        }

        let state = self.state.trim();
        if state.is_empty() {
            return Err(ConfigError::Missing { field: "state" });
        }
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid {
                field: "state",
                reason: format!("expected a two-letter code, got {state:?}"),
            });
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing { field: "output_dir" });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.checkpoint_every == Some(0) {
            return Err(ConfigError::Invalid {
                field: "checkpoint_every",
                reason: "must be at least 1".into(),
            });
        }
        if self
            .api_key
            .as_ref()
            .is_some_and(|key| key.expose_secret().trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "api_key",
                reason: "must not be blank".into(),
            });
        }
        if self.sources.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if let Some(source) = self.sources.iter().find(|s| s.pages == 0) {
            return Err(ConfigError::Invalid {
                field: "pages",
                reason: format!("{} has zero pages", source.url_template),
            });
        }

        self.fetch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ScrapeConfig {
        ScrapeConfig::new("Austin", "TX").with_source(SourceSpec::property("https://x.test/{city}"))
    }

    #[test]
    fn test_valid_config_passes() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_state() {
        let config = ScrapeConfig { state: "Texas".into(), ..valid() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "state", .. })
        ));
    }

    #[test]
    fn test_rejects_missing_city() {
        let config = ScrapeConfig { city: " ".into(), ..valid() };
        assert_eq!(config.validate(), Err(ConfigError::Missing { field: "city" }));
    }

    #[test]
    fn test_api_key_checked_and_hidden() {
        let config = valid().with_api_key("  ");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "api_key", .. })
        ));

        let config = valid().with_api_key("owm-0123456789");
        assert_eq!(config.validate(), Ok(()));
        assert!(!format!("{config:?}").contains("owm-0123456789"));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = valid().with_fetch(FetchConfig::new().with_max_attempts(0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "max_attempts", .. })
        ));
    }

    #[test]
    fn test_rejects_no_sources() {
        let config = ScrapeConfig::new("Austin", "TX");
        assert_eq!(config.validate(), Err(ConfigError::NoTargets));
    }

    #[test]
    fn test_host_interval_override() {
        let fetch = FetchConfig::new()
            .with_min_interval(Duration::from_secs(1))
            .with_host_interval("api.openweathermap.org", Duration::from_millis(200));

        assert_eq!(fetch.interval_for("api.openweathermap.org"), Duration::from_millis(200));
        assert_eq!(fetch.interval_for("listings.example.com"), Duration::from_secs(1));
    }
}
