//! City Scraper CLI
//!
//! Scrapes property listings and environment readings for one city and
//! writes timestamped CSV files. Exits non-zero when every target failed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use city_scraper::{FetchConfig, ScrapeConfig, Scraper, SourceSpec};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "city-scraper", version)]
#[command(about = "Collect property listings and environment data for a city")]
struct Cli {
    /// City name, e.g. "Austin"
    #[arg(long)]
    city: String,

    /// Two-letter state code, e.g. "TX"
    #[arg(long)]
    state: String,

    /// Directory for CSV output
    #[arg(long, default_value = "data")]
    output: PathBuf,

    /// Listing page URL template; supports {city}, {state} and {page}. Repeatable.
    #[arg(long = "listing-url")]
    listing_urls: Vec<String>,

    /// Pages to fetch per listing template
    #[arg(long, default_value_t = 1)]
    pages: u32,

    /// OpenWeatherMap API key; enables the current-weather target
    #[arg(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Latitude for air quality (with --lon and an API key)
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude for air quality (with --lat and an API key)
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Minimum milliseconds between requests to the same host
    #[arg(long, default_value_t = 1000)]
    rate_limit_ms: u64,

    /// Per-host override as HOST=MILLIS. Repeatable.
    #[arg(long = "host-rate-limit", value_parser = parse_host_interval)]
    host_rate_limits: Vec<(String, Duration)>,

    /// Attempts per target, including the first
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// User-Agent header
    #[arg(long, env = "SCRAPER_USER_AGENT")]
    user_agent: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Hosts worked on in parallel
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Rewrite the CSV files after every N completed targets
    #[arg(long)]
    checkpoint_every: Option<usize>,

    /// Skip the combined property and environment CSV
    #[arg(long)]
    no_combined: bool,

    /// Also upsert records into this SQLite database, e.g. sqlite://data/city.db?mode=rwc
    #[cfg(feature = "sqlite")]
    #[arg(long)]
    database: Option<String>,
}

impl Cli {
    fn to_config(&self) -> ScrapeConfig {
        let mut fetch = FetchConfig::new()
            .with_min_interval(Duration::from_millis(self.rate_limit_ms))
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_attempts(self.max_attempts);
        if let Some(user_agent) = &self.user_agent {
            fetch = fetch.with_user_agent(user_agent.clone());
        }
        for (host, interval) in &self.host_rate_limits {
            fetch = fetch.with_host_interval(host.clone(), *interval);
        }

        let mut config = ScrapeConfig::new(&self.city, &self.state)
            .with_output_dir(self.output.clone())
            .with_fetch(fetch)
            .with_concurrency(self.concurrency)
            .with_combined(!self.no_combined);

        if let Some(every) = self.checkpoint_every {
            config = config.with_checkpoint_every(every);
        }

        for template in &self.listing_urls {
            config =
                config.with_source(SourceSpec::property(template.clone()).with_pages(self.pages));
        }

        match (&self.api_key, self.lat.zip(self.lon)) {
            (Some(key), coords) => {
                config = config
                    .with_api_key(key.clone())
                    .with_source(SourceSpec::openweather_current());
                if let Some((lat, lon)) = coords {
                    config = config
                        .with_var("lat", lat.to_string())
                        .with_var("lon", lon.to_string())
                        .with_source(SourceSpec::openweather_air_quality());
                }
            }
            (None, Some(_)) => {
                tracing::warn!("--lat/--lon need an API key, skipping air quality");
            }
            (None, None) => {
                tracing::info!("No API key set, skipping environment data");
            }
        }

        config
    }
}

/// Parse `HOST=MILLIS`.
fn parse_host_interval(raw: &str) -> std::result::Result<(String, Duration), String> {
    let (host, millis) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected HOST=MILLIS, got {raw:?}"))?;
    let host = host.trim();
    if host.is_empty() {
        return Err(format!("missing host in {raw:?}"));
    }
    let millis: u64 = millis
        .trim()
        .parse()
        .map_err(|e| format!("invalid milliseconds in {raw:?}: {e}"))?;

    Ok((host.to_string(), Duration::from_millis(millis)))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env before parsing so env-backed flags see it
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,city_scraper=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.to_config();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight requests");
                cancel.cancel();
            }
        }
    });

    #[allow(unused_mut)]
    let mut scraper = Scraper::new(config);

    #[cfg(feature = "sqlite")]
    if let Some(url) = &cli.database {
        let sink = city_scraper::SqliteSink::new(url)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;
        scraper = scraper.with_sink(std::sync::Arc::new(sink));
    }

    let report = match scraper.run(cancel).await {
        Ok(report) => report,
        Err(e) => {
            if let Some(summary) = e.summary() {
                println!("{summary}");
            }
            return Err(e).context("Scrape failed");
        }
    };

    println!("{}", report.summary);
    for file in &report.files {
        println!("  wrote {}", file.display());
    }

    if report.summary.all_failed() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use city_scraper::SourceKind;

    #[test]
    fn test_parse_host_interval() {
        assert_eq!(
            parse_host_interval("api.openweathermap.org=250"),
            Ok(("api.openweathermap.org".to_string(), Duration::from_millis(250)))
        );
        assert!(parse_host_interval("no-equals").is_err());
        assert!(parse_host_interval("=100").is_err());
        assert!(parse_host_interval("host=fast").is_err());
    }

    #[test]
    fn test_flags_build_config() {
        let cli = Cli::try_parse_from([
            "city-scraper",
            "--city",
            "Austin",
            "--state",
            "TX",
            "--listing-url",
            "https://listings.example.com/{city}?page={page}",
            "--pages",
            "3",
            "--api-key",
            "abc",
            "--lat",
            "30.27",
            "--lon",
            "-97.74",
            "--host-rate-limit",
            "listings.example.com=2000",
            "--no-combined",
        ])
        .unwrap();

        let config = cli.to_config();

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[0].pages, 3);
        assert_eq!(config.sources[1].kind, SourceKind::Environment);
        assert_eq!(config.vars.get("lon").map(String::as_str), Some("-97.74"));
        assert!(!config.write_combined);
        assert_eq!(
            config.fetch.interval_for("listings.example.com"),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_lat_requires_lon() {
        let result = Cli::try_parse_from([
            "city-scraper",
            "--city",
            "Austin",
            "--state",
            "TX",
            "--lat",
            "30.27",
        ]);
        assert!(result.is_err());
    }
}
