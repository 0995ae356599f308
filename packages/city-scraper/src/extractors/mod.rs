//! Extractor implementations and the registry that dispatches on source kind.
//!
//! - `PropertyExtractor` - listing pages (HTML, CSS selectors)
//! - `EnvironmentExtractor` - weather and air-quality endpoints (JSON)
//! - `ExtractorSet` - picks the extractor for a target's [`SourceKind`] tag

pub mod environment;
pub mod normalize;
pub mod property;

pub use environment::EnvironmentExtractor;
pub use property::PropertyExtractor;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigResult;
use crate::traits::extractor::Extractor;
use crate::types::{config::ListingSelectors, target::SourceKind};

/// Extractors keyed by the source kind they handle.
#[derive(Clone, Default)]
pub struct ExtractorSet {
    extractors: HashMap<SourceKind, Arc<dyn Extractor>>,
}

impl ExtractorSet {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Property and environment extractors.
    pub fn standard(selectors: &ListingSelectors) -> ConfigResult<Self> {
        Ok(Self::new()
            .with(PropertyExtractor::new(selectors)?)
            .with(EnvironmentExtractor::new()))
    }

    /// Register an extractor, replacing any previous one for its kind.
    pub fn with(mut self, extractor: impl Extractor + 'static) -> Self {
        self.register(Arc::new(extractor));
        self
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(extractor.kind(), extractor);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(&kind).cloned()
    }

    pub fn contains(&self, kind: SourceKind) -> bool {
        self.extractors.contains_key(&kind)
    }
}

impl std::fmt::Debug for ExtractorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.extractors.keys().collect();
        kinds.sort();
        f.debug_struct("ExtractorSet").field("kinds", &kinds).finish()
    }
}
