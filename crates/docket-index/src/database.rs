//! The collection registry.
//!
//! A [`Database`] owns one [`CollectionEngine`] per collection under a
//! single root directory. Collections auto-create on first touch (the
//! insert path of the HTTP surface) and drop as a unit, deleting their
//! index and schema records.

use std::{path::PathBuf, sync::Arc};

use dashmap::DashMap;
use docket_document::SchemaField;

use crate::{CollectionEngine, IndexError, engine::collection_path, settings::IndexSettings};

/// All collections of one database root.
pub struct Database {
    /// Root directory; each collection gets a subdirectory.
    root: PathBuf,
    /// Settings shared by every engine.
    settings: IndexSettings,
    /// Open engines keyed by collection name.
    engines: DashMap<String, Arc<CollectionEngine>>,
}

impl Database {
    /// Creates a database over a root directory.
    pub fn new(root: impl Into<PathBuf>, settings: IndexSettings) -> Self {
        Self {
            root: root.into(),
            settings,
            engines: DashMap::new(),
        }
    }

    /// Returns the engine for a collection, opening (and creating) it on
    /// first touch.
    pub fn collection(&self, name: &str) -> Result<Arc<CollectionEngine>, IndexError> {
        if let Some(engine) = self.engines.get(name) {
            return Ok(engine.clone());
        }
        // The entry holds its shard lock while the engine opens, so two
        // racing callers cannot open duplicate writers on one directory.
        match self.engines.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let engine = Arc::new(CollectionEngine::open(
                    collection_path(&self.root, name),
                    name,
                    self.settings.clone(),
                )?);
                entry.insert(engine.clone());
                Ok(engine)
            }
        }
    }

    /// Names of the currently open collections.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Schema snapshots of every open collection.
    pub fn schemas(&self) -> Vec<(String, Vec<SchemaField>)> {
        let mut out: Vec<(String, Vec<SchemaField>)> = self
            .engines
            .iter()
            .map(|e| (e.key().clone(), e.value().schema()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Drops a collection: closes its engine and deletes index and schema.
    pub async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        let Some((_, engine)) = self.engines.remove(name) else {
            return Ok(());
        };
        engine.drop_collection().await
    }

    /// Closes every engine.
    pub async fn shutdown(&self) -> Result<(), IndexError> {
        let engines: Vec<Arc<CollectionEngine>> =
            self.engines.iter().map(|e| e.value().clone()).collect();
        self.engines.clear();
        for engine in engines {
            engine.close().await?;
        }
        Ok(())
    }
}
