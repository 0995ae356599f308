//! Target planning: expand source templates into concrete targets.

use indexmap::IndexSet;
use regex::Regex;
use std::sync::LazyLock;
use secrecy::ExposeSecret;
use tracing::debug;
use url::{form_urlencoded, Url};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{
    config::{ScrapeConfig, SourceSpec},
    target::{SourceKind, Target},
};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Expand every source of `config` into targets.
///
/// Pages are numbered from 1. Identical URLs of the same kind are planned
/// once. Target ids are assigned in planning order, starting at 1.
pub fn plan_targets(config: &ScrapeConfig) -> ConfigResult<Vec<Target>> {
    let mut seen: IndexSet<(SourceKind, Url)> = IndexSet::new();

    for source in &config.sources {
        for page in 1..=source.pages {
            let expanded = expand(source, page, config)?;
            let url = parse_target_url(&expanded, &source.url_template)?;
            if !seen.insert((source.kind, url)) {
                debug!(template = %source.url_template, page, "Duplicate target URL dropped");
            }
        }
    }

    if seen.is_empty() {
        return Err(ConfigError::NoTargets);
    }

    Ok(seen
        .into_iter()
        .enumerate()
        .map(|(index, (kind, url))| Target::new(index + 1, url, kind))
        .collect())
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Substitute placeholders in one template.
///
/// `{city}`, `{state}`, `{page}` and `{api_key}` are built in; anything else
/// must be supplied through `ScrapeConfig::vars`.
fn expand(source: &SourceSpec, page: u32, config: &ScrapeConfig) -> ConfigResult<String> {
    let template = source.url_template.as_str();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&resolve(name.as_str(), page, config, template)?);
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}

fn resolve(name: &str, page: u32, config: &ScrapeConfig, template: &str) -> ConfigResult<String> {
    match name {
        "city" => Ok(encode(config.city.trim())),
        "state" => Ok(encode(&config.state.trim().to_ascii_uppercase())),
        "page" => Ok(page.to_string()),
        "api_key" => config
            .api_key
            .as_ref()
            .map(|key| encode(key.expose_secret()))
            .ok_or(ConfigError::Missing { field: "api_key" }),
        other => config
            .vars
            .get(other)
            .map(|value| encode(value))
            .ok_or_else(|| ConfigError::UnknownPlaceholder {
                template: template.to_string(),
                name: other.to_string(),
            }),
    }
}

/// Target URLs must be absolute `http`/`https` with a host.
///
/// Errors name the template, not the expanded URL, so substituted keys
/// stay out of the message.
fn parse_target_url(raw: &str, template: &str) -> ConfigResult<Url> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: template.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".into()));
    }

    Ok(url)
}
