//! Extractor trait and the one-pass record sequence it produces.

use std::fmt;

use crate::error::ParseResult;
use crate::types::{fetch::FetchedContent, record::Record, target::SourceKind};

/// Converts fetched content of one source kind into records.
///
/// Implementations must tolerate missing fields (emit the record without
/// them) and return a `ParseError` only when the document as a whole is
/// unrecognizable.
pub trait Extractor: Send + Sync {
    /// Source kind this extractor handles.
    fn kind(&self) -> SourceKind;

    fn extract(&self, content: &FetchedContent) -> ParseResult<Records>;

    /// Name of this extractor (for logging).
    fn name(&self) -> &str {
        self.kind().as_str()
    }
}

/// Lazy, finite, non-restartable sequence of records.
///
/// Produced by a single pass over a document. It is deliberately not
/// `Clone`: once consumed it is gone.
pub struct Records {
    inner: Box<dyn Iterator<Item = Record> + Send>,
}

impl Records {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Record> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl fmt::Debug for Records {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("size_hint", &self.inner.size_hint())
            .finish()
    }
}
