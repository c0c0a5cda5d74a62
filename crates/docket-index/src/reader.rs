//! Searcher management.
//!
//! One [`SearcherManager`] exists per collection. It wraps a tantivy
//! `IndexReader` configured for manual reloads: committed writes become
//! visible when [`SearcherManager::refresh`] runs, which the engine's
//! background tick does about once a second (and callers can force for
//! read-your-own-writes).
//!
//! [`SearcherManager::acquire`] returns the most recently published
//! point-in-time searcher. The returned handle pins index segments while it
//! lives and releases them on drop, so every acquire is paired with a
//! release on all exit paths for free.

use tantivy::{Index, IndexReader, ReloadPolicy, Searcher};

use crate::IndexError;

/// Publishes point-in-time searchers over a collection index.
#[derive(Clone)]
pub struct SearcherManager {
    /// The underlying reader.
    reader: IndexReader,
}

impl SearcherManager {
    /// Creates a manager over an opened index.
    pub fn new(index: &Index) -> Result<Self, IndexError> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::Write(e.to_string()))?;
        Ok(Self { reader })
    }

    /// Borrows the current point-in-time view. Dropping the searcher
    /// returns it.
    pub fn acquire(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Republishes a view including everything committed so far.
    pub fn refresh(&self) -> Result<(), IndexError> {
        self.reader
            .reload()
            .map_err(|e| IndexError::Write(e.to_string()))
    }
}
