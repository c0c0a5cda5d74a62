//! Error types for the docket-index crate.

use std::{io, path::PathBuf};

use docket_document::SchemaError;
use docket_query::QueryError;
use thiserror::Error;

/// Errors that can occur while indexing or searching a collection.
///
/// Query and schema variants correspond to caller mistakes (a 4xx at the
/// HTTP surface); the open/write/commit/IO variants are engine failures
/// (5xx) after which the writer may need to be recycled.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failed to open or create the index.
    #[error("failed to open index at {path}: {message}")]
    OpenIndex {
        /// Path to the index directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to write to the index.
    #[error("failed to write to index: {0}")]
    Write(String),

    /// Failed to commit changes to the index.
    #[error("failed to commit index: {0}")]
    Commit(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The query string could not be parsed or compiled.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The document was structurally unusable (missing or mistyped `_id`,
    /// not an object). Individual bad fields never raise this; they are
    /// skipped.
    #[error(transparent)]
    Document(#[from] SchemaError),

    /// Search criteria failed validation.
    #[error("invalid search criteria: {0}")]
    InvalidCriteria(String),

    /// The engine was already closed or is shutting down.
    #[error("the collection engine is closed")]
    EngineClosed,
}

impl IndexError {
    /// Creates an `OpenIndex` error from a path and tantivy error.
    pub(crate) fn open_index(path: PathBuf, source: &tantivy::TantivyError) -> Self {
        Self::OpenIndex {
            path,
            message: source.to_string(),
        }
    }

    /// Creates a `Write` error from a tantivy error.
    pub(crate) fn write(source: &tantivy::TantivyError) -> Self {
        Self::Write(source.to_string())
    }

    /// Creates a `Commit` error from a tantivy error.
    pub(crate) fn commit(source: &tantivy::TantivyError) -> Self {
        Self::Commit(source.to_string())
    }

    /// True when the error is the caller's fault (bad query, bad document,
    /// bad criteria) rather than an engine failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Query(_) | Self::Document(_) | Self::InvalidCriteria(_)
        )
    }
}
