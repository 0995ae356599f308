//! Testing utilities including a scripted transport and document fixtures.
//!
//! These are useful for exercising the pipeline without making real
//! network calls.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::traits::transport::Transport;
use crate::types::fetch::FetchedContent;

/// A canned response for [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    Ok {
        body: Bytes,
        content_type: Option<String>,
    },
    Status(u16),
    Timeout,
    NetworkError(String),
}

impl MockResponse {
    pub fn html(body: impl Into<String>) -> Self {
        MockResponse::Ok {
            body: Bytes::from(body.into()),
            content_type: Some("text/html; charset=utf-8".into()),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        MockResponse::Ok {
            body: Bytes::from(body.into()),
            content_type: Some("application/json".into()),
        }
    }

    pub fn status(status: u16) -> Self {
        MockResponse::Status(status)
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        MockResponse::NetworkError(message.into())
    }

    fn into_result(self, url: &Url) -> FetchResult {
        match self {
            MockResponse::Ok { body, content_type } => {
                let mut content = FetchedContent::new(url.clone(), body);
                content.content_type = content_type;
                Ok(content)
            }
            MockResponse::Status(status) if (200..300).contains(&status) => {
                Ok(FetchedContent::new(url.clone(), Bytes::new()).with_status(status))
            }
            MockResponse::Status(status) => Err(FetchError::Http {
                url: url.to_string(),
                status,
            }),
            MockResponse::Timeout => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
            MockResponse::NetworkError(message) => Err(FetchError::Network {
                url: url.to_string(),
                message,
            }),
        }
    }
}

/// Record of a call made to the mock transport.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: String,
    pub host: String,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<MockResponse>,
    sticky: Option<MockResponse>,
}

#[derive(Debug, Default)]
struct MockState {
    scripts: HashMap<String, Script>,
    calls: Vec<MockCall>,
    in_flight: HashMap<String, usize>,
    peak_in_flight: HashMap<String, usize>,
}

/// A scripted transport for testing.
///
/// Responses are keyed by exact URL. A sequence is served in order and its
/// last entry repeats once the sequence is exhausted. Unknown URLs answer
/// HTTP 404.
///
/// # Example
///
/// ```rust
/// use city_scraper::testing::{MockResponse, MockTransport};
///
/// let mock = MockTransport::new()
///     .with_sequence("https://x.test/2", vec![MockResponse::status(500), MockResponse::html("<p/>")]);
/// assert_eq!(mock.call_count("https://x.test/2"), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `url` with `response`.
    pub fn with_response(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.with_sequence(url, vec![response])
    }

    /// Answer `url` with `responses` in order, repeating the last one.
    pub fn with_sequence(self, url: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        {
            let mut state = self.lock();
            let sticky = responses.last().cloned();
            state.scripts.insert(
                url.into(),
                Script {
                    queue: responses.into(),
                    sticky,
                },
            );
        }
        self
    }

    /// Delay every response, to observe overlap between requests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.url == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// Highest number of simultaneous requests observed for `host`.
    pub fn peak_in_flight(&self, host: &str) -> usize {
        self.lock().peak_in_flight.get(host).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, url: &Url) -> MockResponse {
        let host = host_key(url);
        let mut state = self.lock();

        state.calls.push(MockCall {
            url: url.to_string(),
            host: host.clone(),
            at: Instant::now(),
        });

        let in_flight = state.in_flight.entry(host.clone()).or_insert(0);
        *in_flight += 1;
        let current = *in_flight;
        let peak = state.peak_in_flight.entry(host).or_insert(0);
        *peak = (*peak).max(current);

        match state.scripts.get_mut(url.as_str()) {
            Some(script) => script
                .queue
                .pop_front()
                .or_else(|| script.sticky.clone())
                .unwrap_or(MockResponse::Status(404)),
            None => MockResponse::Status(404),
        }
    }

    fn end(&self, url: &Url) {
        let mut state = self.lock();
        if let Some(in_flight) = state.in_flight.get_mut(&host_key(url)) {
            *in_flight = in_flight.saturating_sub(1);
        }
    }
}

fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url) -> FetchResult {
        let response = self.begin(url);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.end(url);
        response.into_result(url)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Document builders matching the default extractor conventions.
pub mod fixtures {
    use serde_json::json;

    /// One listing: property id plus `(field, text)` pairs.
    pub type Listing<'a> = (&'a str, &'a [(&'a str, &'a str)]);

    /// Listing page in the default `data-listings` markup.
    pub fn listing_page(listings: &[Listing<'_>]) -> String {
        let mut html = String::from(
            "<!doctype html><html><head><title>Listings</title></head><body>\n<section data-listings>\n",
        );
        for (id, fields) in listings {
            html.push_str(&format!("  <article class=\"listing\" data-property-id=\"{id}\">\n"));
            for (name, value) in fields.iter() {
                html.push_str(&format!("    <span data-field=\"{name}\">{value}</span>\n"));
            }
            html.push_str("  </article>\n");
        }
        html.push_str("</section>\n</body></html>");
        html
    }

    /// OpenWeatherMap current-weather response.
    pub fn weather_json(station: &str, observed_at: i64, temperature: f64) -> String {
        json!({
            "coord": { "lon": -97.74, "lat": 30.27 },
            "weather": [{ "id": 800, "main": "Clear", "description": "clear sky" }],
            "main": {
                "temp": temperature,
                "feels_like": temperature + 1.5,
                "humidity": 40,
                "pressure": 1015
            },
            "visibility": 10000,
            "wind": { "speed": 8.05 },
            "dt": observed_at,
            "id": 4671654,
            "name": station
        })
        .to_string()
    }

    /// OpenWeatherMap air-pollution response with one reading per timestamp.
    pub fn air_quality_json(lat: f64, lon: f64, observed: &[(i64, i64)]) -> String {
        let list: Vec<_> = observed
            .iter()
            .map(|(dt, aqi)| {
                json!({
                    "main": { "aqi": aqi },
                    "components": {
                        "co": 201.94, "no2": 0.77, "o3": 68.66,
                        "pm2_5": 0.5, "pm10": 0.54
                    },
                    "dt": dt
                })
            })
            .collect();

        json!({ "coord": { "lon": lon, "lat": lat }, "list": list }).to_string()
    }
}
