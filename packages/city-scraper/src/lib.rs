//! City Property and Environment Scraper
//!
//! A polite, resilient fetch-and-extract pipeline that collects property
//! listings and environment readings (weather, air quality) for one city and
//! writes them as timestamped CSV files.
//!
//! # Design
//!
//! - One request in flight per host, a minimum interval between requests to
//!   the same host, bounded retries with exponential backoff and jitter
//! - A failing target is recorded in the run summary and never aborts the run
//! - Records are deduplicated by natural key, last write wins
//! - Network, parsing and persistence sit behind traits so each can be
//!   swapped (scripted transports in tests, SQLite instead of CSV)
//!
//! # Usage
//!
//! ```rust,ignore
//! use city_scraper::{ScrapeConfig, Scraper, SourceSpec};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ScrapeConfig::new("Austin", "TX")
//!     .with_output_dir("data")
//!     .with_api_key(std::env::var("OPENWEATHER_API_KEY")?)
//!     .with_source(SourceSpec::property("https://listings.example.com/{city}-{state}?page={page}").with_pages(3))
//!     .with_source(SourceSpec::openweather_current());
//!
//! let report = Scraper::new(config).run(CancellationToken::new()).await?;
//! println!("{}", report.summary);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Transport, Extractor, SnapshotSink)
//! - [`types`] - Targets, records, configuration and run summaries
//! - [`fetch`] - HTTP transport, per-host rate limiting, retry policy
//! - [`extractors`] - Listing page and weather/air-quality extractors
//! - [`stores`] - Record storage (RecordStore, optional SQLite sink)
//! - [`export`] - CSV export
//! - [`pipeline`] - Target planning, orchestration and the run entry point
//! - [`testing`] - Scripted transport and document fixtures

pub mod error;
pub mod export;
pub mod extractors;
pub mod fetch;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{ConfigError, ExportError, FetchError, ParseError, ScrapeError};
pub use traits::{
    extractor::{Extractor, Records},
    sink::{PersistReport, SnapshotSink},
    transport::Transport,
};
pub use types::{
    config::{FetchConfig, ListingSelectors, ScrapeConfig, SourceSpec, DEFAULT_USER_AGENT},
    fetch::FetchedContent,
    record::{FieldValue, NaturalKey, Record},
    summary::{FailureReason, RunSummary, TargetOutcome},
    target::{SourceKind, Target, TargetId, TargetState},
};

// Re-export components
pub use export::CsvExporter;
pub use extractors::{EnvironmentExtractor, ExtractorSet, PropertyExtractor};
pub use fetch::{Fetcher, HostRateLimiter, HttpTransport, RetryPolicy};
pub use pipeline::{plan_targets, Orchestrator, RunReport, Scraper};
pub use stores::{IngestStats, RecordStore, Snapshot};

#[cfg(feature = "sqlite")]
pub use stores::SqliteSink;
