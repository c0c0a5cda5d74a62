//! Schema persistence.
//!
//! The live schema must survive restarts, so the engine writes it out after
//! any write that extended it and hydrates it before the index reopens.
//! [`SchemaStore`] is the seam: the default [`FileSchemaStore`] keeps a
//! pretty-printed `schema.json` next to the index, and a host that keeps
//! schema records in its own store can plug in another implementation.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use docket_document::Schema;

use crate::IndexError;

/// Loads and saves one collection's schema.
pub trait SchemaStore: Send + Sync {
    /// Loads the persisted schema, or `None` when none was saved yet.
    fn load(&self) -> Result<Option<Schema>, IndexError>;

    /// Persists the current schema.
    fn save(&self, schema: &Schema) -> Result<(), IndexError>;

    /// Removes the persisted schema (collection drop).
    fn delete(&self) -> Result<(), IndexError>;
}

/// Stores the schema as a JSON file.
pub struct FileSchemaStore {
    /// Full path of the schema file.
    path: PathBuf,
}

impl FileSchemaStore {
    /// Creates a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional schema file inside a collection directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("schema.json"))
    }
}

impl SchemaStore for FileSchemaStore {
    fn load(&self) -> Result<Option<Schema>, IndexError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| {
                IndexError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("failed to parse schema file: {e}"),
                ))
            })
    }

    fn save(&self, schema: &Schema) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(schema).map_err(|e| {
            IndexError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to serialize schema: {e}"),
            ))
        })?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), IndexError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
