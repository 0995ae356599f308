//! Whole-run entry point: validate, plan, fetch, persist.

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Result, ScrapeError};
use crate::export::CsvExporter;
use crate::extractors::ExtractorSet;
use crate::fetch::Fetcher;
use crate::pipeline::{orchestrator::Orchestrator, plan::plan_targets};
use crate::stores::RecordStore;
use crate::traits::{sink::SnapshotSink, transport::Transport};
use crate::types::{config::ScrapeConfig, summary::RunSummary};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,

    /// Files written by the exporter and any extra sinks
    pub files: Vec<PathBuf>,

    /// Records in the final snapshot
    pub records: usize,
}

/// Builder for one scrape run.
///
/// # Example
///
/// ```rust,ignore
/// use city_scraper::{ScrapeConfig, Scraper, SourceSpec};
/// use tokio_util::sync::CancellationToken;
///
/// let config = ScrapeConfig::new("Austin", "TX")
///     .with_source(SourceSpec::property("https://listings.example.com/{city}-{state}?page={page}").with_pages(3));
///
/// let report = Scraper::new(config).run(CancellationToken::new()).await?;
/// println!("{}", report.summary);
/// ```
pub struct Scraper {
    config: ScrapeConfig,
    transport: Option<Arc<dyn Transport>>,
    extractors: Option<ExtractorSet>,
    sinks: Vec<Arc<dyn SnapshotSink>>,
}

impl Scraper {
    pub fn new(config: ScrapeConfig) -> Self {
        Self {
            config,
            transport: None,
            extractors: None,
            sinks: Vec::new(),
        }
    }

    /// Replace the HTTP transport (tests, proxies, recorded fixtures).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the standard extractors.
    pub fn with_extractors(mut self, extractors: ExtractorSet) -> Self {
        self.extractors = Some(extractors);
        self
    }

    /// Also persist the final snapshot to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Run to completion.
    ///
    /// Configuration errors are returned before any request is made. After
    /// that the run always produces a summary. If persisting the final
    /// snapshot fails, every sink is still tried and the first failure is
    /// returned as [`ScrapeError::Export`] with the summary attached. A
    /// cancelled run still persists what was ingested.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunReport> {
        let config = &self.config;
        config.validate()?;

        let targets = plan_targets(config)?;
        let extractors = match self.extractors {
            Some(extractors) => extractors,
            None => ExtractorSet::standard(&config.selectors)?,
        };
        let fetcher = match self.transport {
            Some(transport) => Fetcher::new(transport, &config.fetch),
            None => Fetcher::http(&config.fetch)?,
        };

        info!(
            city = %config.city,
            state = %config.state,
            targets = targets.len(),
            output_dir = %config.output_dir.display(),
            "Scrape configured"
        );

        let exporter = CsvExporter::new(&config.output_dir, &config.city, &config.state)
            .with_combined(config.write_combined);

        let store = Arc::new(RecordStore::new());
        let mut orchestrator = Orchestrator::new(fetcher, extractors, store.clone())
            .with_concurrency(config.concurrency);
        if let Some(every) = config.checkpoint_every {
            orchestrator = orchestrator.with_checkpoint(every, Arc::new(exporter.clone()));
        }

        let summary = orchestrator.run(targets, cancel.clone()).await;
        if cancel.is_cancelled() {
            warn!(skipped = summary.skipped(), "Run cancelled, persisting partial results");
        }

        let snapshot = store.flush();
        let mut files = Vec::new();
        let mut first_error = None;
        let mut sinks: Vec<&dyn SnapshotSink> = vec![&exporter];
        for sink in &self.sinks {
            sinks.push(sink.as_ref());
        }
        for sink in sinks {
            match sink.persist(&snapshot).await {
                Ok(report) => {
                    info!(sink = sink.name(), records = report.records, "Snapshot persisted");
                    files.extend(report.files);
                }
                Err(e) => {
                    error!(sink = sink.name(), error = %e, "Failed to persist snapshot");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(source) = first_error {
            return Err(ScrapeError::Export {
                source,
                summary: Box::new(summary),
            });
        }

        Ok(RunReport {
            summary,
            files,
            records: snapshot.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ExportError};
    use crate::testing::{fixtures, MockResponse, MockTransport};
    use crate::types::config::SourceSpec;

    #[tokio::test]
    async fn test_config_error_before_any_request() {
        let mock = MockTransport::new();
        let config = ScrapeConfig::new("Austin", "Texas")
            .with_source(SourceSpec::property("https://x.test/{city}"));

        let err = Scraper::new(config)
            .with_transport(Arc::new(mock.clone()))
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Config(ConfigError::Invalid { field: "state", .. })));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_template_before_any_request() {
        let mock = MockTransport::new();
        let config = ScrapeConfig::new("Austin", "TX")
            .with_source(SourceSpec::property("https://x.test/ok"))
            .with_source(SourceSpec::property("gopher://x.test/{city}"));

        let err = Scraper::new(config)
            .with_transport(Arc::new(mock.clone()))
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Config(ConfigError::InvalidUrl { .. })));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_export_failure_keeps_summary() {
        // A file where the output directory should be
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("data");
        std::fs::write(&blocked, "").unwrap();

        let url = "https://x.test/listings";
        let mock = MockTransport::new().with_response(
            url,
            MockResponse::html(fixtures::listing_page(&[("P-1", &[("price", "$100")])])),
        );
        let config = ScrapeConfig::new("Austin", "TX")
            .with_output_dir(&blocked)
            .with_source(SourceSpec::property(url));

        let err = Scraper::new(config)
            .with_transport(Arc::new(mock.clone()))
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ScrapeError::Export { source: ExportError::Io(_), .. }));
        let summary = err.summary().expect("summary kept");
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.records(), 1);
        assert_eq!(mock.total_calls(), 1);
    }
}
