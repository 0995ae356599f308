//! Raw content returned by a successful fetch.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{ParseError, ParseResult};
use crate::types::target::redact_url;

/// Immutable response body plus the metadata extractors need.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// URL the content was requested from
    pub url: Url,

    /// Raw response body
    pub body: Bytes,

    /// MIME type from the `Content-Type` header, if any
    pub content_type: Option<String>,

    /// HTTP status of the response
    pub status: u16,

    /// When the response was received
    pub fetched_at: DateTime<Utc>,
}

impl FetchedContent {
    pub fn new(url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            body: body.into(),
            content_type: None,
            status: 200,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// URL with credential-like query values masked, for errors and logs.
    pub fn display_url(&self) -> String {
        redact_url(&self.url)
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> ParseResult<&str> {
        std::str::from_utf8(&self.body).map_err(|e| ParseError::Decode {
            url: self.display_url(),
            reason: e.to_string(),
        })
    }

    /// Check whether the declared content type mentions `needle`.
    pub fn is_content_type(&self, needle: &str) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(needle))
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
