//! Weather and air-quality extractor for OpenWeatherMap-style JSON.
//!
//! Two shapes are recognized:
//!
//! - current weather: a top-level `main` object, one record keyed by
//!   station and observation time
//! - air pollution: a top-level `list` array, one record per reading keyed
//!   by coordinates and observation time

use chrono::DateTime;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ParseError, ParseResult};
use crate::traits::extractor::{Extractor, Records};
use crate::types::{
    fetch::FetchedContent,
    record::{FieldValue, NaturalKey, Record},
    target::SourceKind,
};

/// Scalar fields copied from a current-weather response, by JSON pointer.
const WEATHER_FIELDS: [(&str, &str); 7] = [
    ("temperature", "/main/temp"),
    ("feels_like", "/main/feels_like"),
    ("humidity", "/main/humidity"),
    ("pressure", "/main/pressure"),
    ("weather_description", "/weather/0/description"),
    ("wind_speed", "/wind/speed"),
    ("visibility", "/visibility"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentExtractor;

impl EnvironmentExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for EnvironmentExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Environment
    }

    fn extract(&self, content: &FetchedContent) -> ParseResult<Records> {
        let url = content.display_url();
        let mut value: Value =
            serde_json::from_str(content.text()?).map_err(|e| ParseError::Decode {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if value.get("main").is_some_and(Value::is_object) {
            debug!(url = %url, "Current weather response");
            return Ok(Records::new(
                std::iter::once_with(move || weather_record(&value, &url)).flatten(),
            ));
        }

        let list = value.get_mut("list").map(Value::take);
        if let Some(Value::Array(readings)) = list {
            let Some(station) = coordinates(&value) else {
                warn!(url = %url, "Air quality response without coordinates");
                return Ok(Records::empty());
            };
            debug!(url = %url, readings = readings.len(), "Air quality response");
            return Ok(Records::new(
                readings
                    .into_iter()
                    .filter_map(move |reading| air_quality_record(&station, &reading, &url)),
            ));
        }

        Err(ParseError::UnrecognizedShape {
            url,
            reason: "expected a `main` object or a `list` array".into(),
        })
    }

    fn name(&self) -> &str {
        "openweather"
    }
}

/// Unix seconds as RFC 3339.
fn observed_at(value: &Value) -> Option<(i64, String)> {
    let dt = value.get("dt")?.as_i64()?;
    let at = DateTime::from_timestamp(dt, 0)?;
    Some((dt, at.to_rfc3339()))
}

/// `lat,lon` from the `coord` object.
fn coordinates(value: &Value) -> Option<String> {
    let lat = value.pointer("/coord/lat")?.as_f64()?;
    let lon = value.pointer("/coord/lon")?.as_f64()?;
    Some(format!("{lat},{lon}"))
}

/// Station name, falling back to the numeric city id.
fn station(value: &Value) -> Option<String> {
    match value.get("name").and_then(Value::as_str).map(str::trim) {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        _ => value.get("id").and_then(Value::as_i64).map(|id| id.to_string()),
    }
}

fn scalar(value: &Value, pointer: &str) -> Option<FieldValue> {
    value
        .pointer(pointer)
        .and_then(FieldValue::from_json)
        .filter(|v| !v.is_null())
}

fn weather_record(value: &Value, url: &str) -> Option<Record> {
    let (Some(station), Some((dt, observed))) = (station(value), observed_at(value)) else {
        warn!(url = %url, "Weather response without station or timestamp");
        return None;
    };

    let mut record = Record::new(
        NaturalKey::new(SourceKind::Environment, [station.clone(), dt.to_string()]),
        url,
    )
    .with_field("station", station)
    .with_field("observed_at", observed);

    for (name, pointer) in WEATHER_FIELDS {
        if let Some(field) = scalar(value, pointer) {
            record.set(name, field);
        }
    }

    Some(record)
}

fn air_quality_record(station: &str, reading: &Value, url: &str) -> Option<Record> {
    let Some((dt, observed)) = observed_at(reading) else {
        warn!(url = %url, "Air quality reading without timestamp");
        return None;
    };

    let mut record = Record::new(
        NaturalKey::new(SourceKind::Environment, [station.to_string(), dt.to_string()]),
        url,
    )
    .with_field("station", station)
    .with_field("observed_at", observed);

    if let Some(aqi) = scalar(reading, "/main/aqi") {
        record.set("aqi", aqi);
    }

    if let Some(components) = reading.get("components").and_then(Value::as_object) {
        for (name, component) in components {
            if let Some(field) = FieldValue::from_json(component).filter(|v| !v.is_null()) {
                record.set(name.as_str(), field);
            }
        }
    }

    Some(record)
}
