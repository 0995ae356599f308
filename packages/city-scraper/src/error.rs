//! Typed errors for the scraping pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Fetch and parse errors are
//! recovered per target by the orchestrator; config and export errors
//! surface to the caller.

use thiserror::Error;

use crate::types::{fetch::FetchedContent, summary::RunSummary};

/// Failures produced by a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Request did not complete within the configured timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Connection, DNS, TLS or body read failure
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    /// Timeouts, network failures and 5xx responses are worth retrying.
    /// Every 4xx is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Http { status, .. } => (500..600).contains(status),
        }
    }

    /// URL the failed request was sent to.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::Http { url, .. }
            | FetchError::Network { url, .. } => url,
        }
    }

    /// Swap the URL for `display` wherever the error mentions it.
    pub(crate) fn with_display_url(self, raw: &str, display: &str) -> Self {
        match self {
            FetchError::Timeout { .. } => FetchError::Timeout {
                url: display.to_string(),
            },
            FetchError::Http { status, .. } => FetchError::Http {
                url: display.to_string(),
                status,
            },
            FetchError::Network { message, .. } => FetchError::Network {
                url: display.to_string(),
                message: message.replace(raw, display),
            },
        }
    }

    /// Short machine-friendly label, used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Http { .. } => "http_error",
            FetchError::Network { .. } => "network_error",
        }
    }
}

/// Failures produced by an extractor.
///
/// Raised only when a document as a whole is unusable; a missing field is
/// never a `ParseError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The expected container or top-level structure is absent
    #[error("unrecognized document at {url}: {reason}")]
    UnrecognizedShape { url: String, reason: String },

    /// The body could not be decoded (invalid UTF-8, malformed JSON)
    #[error("cannot decode body of {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Configuration rejected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Required value missing
    #[error("missing required setting: {field}")]
    Missing { field: &'static str },

    /// Value present but unusable
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Target URL failed to parse or uses a disallowed scheme
    #[error("invalid target URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// CSS selector failed to compile
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// URL template references a variable that was never supplied
    #[error("URL template {template:?} uses unknown placeholder {{{name}}}")]
    UnknownPlaceholder { template: String, name: String },

    /// Configuration expands to zero targets
    #[error("configuration produces no targets")]
    NoTargets,
}

/// Errors raised while persisting a snapshot.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database or other storage backend failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Run-level errors. Everything else is recorded against its target.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Configuration was rejected
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Targets ran but the snapshot could not be persisted. Carries the
    /// summary of the run that produced it.
    #[error("export failed: {source}")]
    Export {
        source: ExportError,
        summary: Box<RunSummary>,
    },
}

impl ScrapeError {
    /// Summary of the run, when targets were processed before the error.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            ScrapeError::Config(_) => None,
            ScrapeError::Export { summary, .. } => Some(summary.as_ref()),
        }
    }
}

/// Outcome of a fetch: raw content or a typed failure. Callers must handle
/// both branches.
pub type FetchResult<T = FetchedContent> = std::result::Result<T, FetchError>;

/// Result type alias for extraction.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result type alias for configuration checks.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for persistence.
pub type ExportResult<T> = std::result::Result<T, ExportError>;

/// Result type alias for whole runs.
pub type Result<T> = std::result::Result<T, ScrapeError>;
