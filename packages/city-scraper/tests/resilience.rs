//! Retry bounds, terminal errors, isolation and deduplication across a run.

use std::sync::Arc;
use std::time::Duration;

use city_scraper::{
    plan_targets,
    testing::{fixtures, MockResponse, MockTransport},
    FailureReason, FetchConfig, FetchError, ParseError, RetryPolicy, RunReport, ScrapeConfig,
    Scraper, SourceSpec, TargetState,
};
use tokio_util::sync::CancellationToken;

fn config(dir: &std::path::Path, pages: u32) -> ScrapeConfig {
    ScrapeConfig::new("Austin", "TX")
        .with_output_dir(dir)
        .with_combined(false)
        .with_fetch(
            FetchConfig::new()
                .with_min_interval(Duration::ZERO)
                .with_retry(RetryPolicy::immediate(3)),
        )
        .with_source(
            SourceSpec::property("https://listings.test/{city}?page={page}").with_pages(pages),
        )
}

async fn run(config: ScrapeConfig, mock: &MockTransport) -> RunReport {
    Scraper::new(config)
        .with_transport(Arc::new(mock.clone()))
        .run(CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1);
    let url = plan_targets(&config).unwrap()[0].url.to_string();

    let mock = MockTransport::new()
        .with_response(url.as_str(), MockResponse::network_error("connection reset"));
    let report = run(config, &mock).await;

    assert_eq!(mock.call_count(&url), 3);
    assert_eq!(report.summary.outcomes[0].attempts, 3);
    assert!(matches!(
        report.summary.outcomes[0].failure,
        Some(FailureReason::Fetch(FetchError::Network { .. }))
    ));
    assert!(report.summary.all_failed());
    assert!(report.files.is_empty());
}

#[tokio::test]
async fn test_not_found_is_attempted_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1);
    let url = plan_targets(&config).unwrap()[0].url.to_string();

    let mock = MockTransport::new().with_response(url.as_str(), MockResponse::status(404));
    let report = run(config, &mock).await;

    assert_eq!(mock.call_count(&url), 1);
    assert_eq!(report.summary.failed(), 1);
    assert!(report.summary.to_string().contains("1 failed"));
}

#[tokio::test]
async fn test_unrecognized_page_does_not_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 3);
    let targets = plan_targets(&config).unwrap();

    let mock = MockTransport::new()
        .with_response(
            targets[0].url.as_str(),
            MockResponse::html(fixtures::listing_page(&[("P-1", &[("price", "$100")])])),
        )
        .with_response(
            targets[1].url.as_str(),
            MockResponse::html("<html><body>Please verify you are human</body></html>"),
        )
        .with_response(
            targets[2].url.as_str(),
            MockResponse::html(fixtures::listing_page(&[("P-3", &[("price", "$300")])])),
        );
    let report = run(config, &mock).await;

    let summary = &report.summary;
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.outcomes[1].state, TargetState::Failed);
    assert!(matches!(
        summary.outcomes[1].failure,
        Some(FailureReason::Parse(ParseError::UnrecognizedShape { .. }))
    ));
    assert!(!summary.all_failed());
    assert_eq!(report.records, 2);
    assert_eq!(report.files.len(), 1);
}

#[tokio::test]
async fn test_listing_seen_twice_keeps_latest_values() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 2);
    let targets = plan_targets(&config).unwrap();

    let mock = MockTransport::new()
        .with_response(
            targets[0].url.as_str(),
            MockResponse::html(fixtures::listing_page(&[
                ("P-1", &[("price", "$100,000")]),
                ("P-2", &[("price", "$200,000")]),
            ])),
        )
        .with_response(
            targets[1].url.as_str(),
            MockResponse::html(fixtures::listing_page(&[("P-1", &[("price", "$95,000")])])),
        );

    let report = run(config, &mock).await;

    assert_eq!(report.records, 2);
    let csv = std::fs::read_to_string(&report.files[0]).unwrap();
    let rows: Vec<&str> = csv
        .lines()
        .map(|line| line.rsplit_once(',').map_or(line, |(fields, _)| fields))
        .collect();
    assert_eq!(rows, vec!["property_id,price", "P-1,95000", "P-2,200000"]);
}

#[tokio::test]
async fn test_rejected_api_key_stays_out_of_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1)
        .with_api_key("SUPERSECRET123")
        .with_source(SourceSpec::openweather_current());
    let targets = plan_targets(&config).unwrap();
    assert!(targets[1].url.as_str().contains("SUPERSECRET123"));

    let mock = MockTransport::new()
        .with_response(
            targets[0].url.as_str(),
            MockResponse::html(fixtures::listing_page(&[("P-1", &[("price", "$100")])])),
        )
        .with_response(targets[1].url.as_str(), MockResponse::status(401));
    let report = run(config, &mock).await;

    assert_eq!(report.summary.failed(), 1);
    let text = report.summary.to_string();
    assert!(text.contains("appid=***"), "{text}");
    assert!(!text.contains("SUPERSECRET123"), "{text}");
    assert!(!format!("{:?}", report.summary).contains("SUPERSECRET123"));
}
