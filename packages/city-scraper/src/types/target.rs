//! Targets: units of scrape work and their lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;
use url::Url;

/// Which kind of source a target points at. Selects the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Property listing pages (HTML)
    Property,
    /// Environmental data endpoints (JSON)
    Environment,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Property, SourceKind::Environment];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Property => "property",
            SourceKind::Environment => "environment",
        }
    }

    /// Prefix used for exported file names.
    pub fn file_stem(&self) -> &'static str {
        match self {
            SourceKind::Property => "properties",
            SourceKind::Environment => "environment",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "property" | "properties" => Ok(SourceKind::Property),
            "environment" | "env" => Ok(SourceKind::Environment),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// Stable identifier of a target within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub usize);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Retry bookkeeping owned by a single target.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Fetch attempts made so far
    pub attempts: u32,

    /// Earliest moment the next attempt may start
    pub next_allowed_at: Option<Instant>,
}

impl RetryState {
    /// True once the target has waited out its backoff.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.next_allowed_at.map_or(true, |at| at <= now)
    }
}

/// One unit of scrape work.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub url: Url,
    pub kind: SourceKind,
    pub retry: RetryState,
}

impl Target {
    pub fn new(id: usize, url: Url, kind: SourceKind) -> Self {
        Self {
            id: TargetId(id),
            url,
            kind,
            retry: RetryState::default(),
        }
    }

    /// Host key used for rate limiting and lane assignment.
    ///
    /// Includes an explicit port so local test servers on different ports
    /// are treated as different hosts.
    pub fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// URL safe to log: credential-like query parameters are masked.
    pub fn display_url(&self) -> String {
        redact_url(&self.url)
    }
}

const SECRET_PARAMS: [&str; 4] = ["appid", "api_key", "apikey", "key"];

/// Mask the values of credential-like query parameters.
pub fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }

    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let masked = SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str());
            let value = if masked { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();

    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Lifecycle of a target inside the orchestrator.
///
/// `Pending -> Fetching -> {Extracting -> Ingested} | Failed`; a retryable
/// fetch failure moves `Fetching` back to `Pending`. `Skipped` marks targets
/// never dequeued because the run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Pending,
    Fetching,
    Extracting,
    Ingested,
    Failed,
    Skipped,
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TargetState::Ingested | TargetState::Failed | TargetState::Skipped
        )
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetState::Pending => "pending",
            TargetState::Fetching => "fetching",
            TargetState::Extracting => "extracting",
            TargetState::Ingested => "ingested",
            TargetState::Failed => "failed",
            TargetState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}
