//! Engine configuration.

use std::time::Duration;

/// Settings shared by every collection engine a database opens.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Facet-enable every new non-metadata field as it is first seen.
    pub auto_facet: bool,
    /// Lowercase tokens in the full-text pipeline.
    pub lowercase: bool,
    /// Apply English stemming in the full-text pipeline.
    pub stemming: bool,
    /// Term that selects explicitly-null values in queries (`field:_null_`).
    pub null_token: String,
    /// How often the background tick republishes a fresh searcher.
    pub refresh_interval: Duration,
    /// Heap handed to the tantivy writer.
    pub writer_heap_bytes: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            auto_facet: false,
            lowercase: true,
            stemming: true,
            null_token: "_null_".to_string(),
            refresh_interval: Duration::from_secs(1),
            writer_heap_bytes: 50_000_000,
        }
    }
}

impl IndexSettings {
    /// Returns settings with auto-faceting switched on.
    pub fn with_auto_facet(mut self) -> Self {
        self.auto_facet = true;
        self
    }
}
