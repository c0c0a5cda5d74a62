//! Tantivy-based search core for docket collections.
//!
//! This crate turns schemaless JSON documents into a richly indexed
//! collection and answers Lucene-style queries over it. It provides:
//! - Index creation and per-collection lifecycle via [`CollectionEngine`]
//!   and the [`Database`] registry
//! - Document lowering against the evolving schema (value, sort, grouping,
//!   and null-marker columns plus the synthesized full-text field)
//! - Typed query compilation via [`query::QueryCompiler`]
//! - Searches with sorting, pagination, facet drill-downs, and highlighting
//!
//! # Indexing
//!
//! ```ignore
//! use docket_index::{CollectionEngine, IndexSettings};
//!
//! let engine = CollectionEngine::open(dir, "books", IndexSettings::default())?;
//! let id = engine.insert_json(serde_json::json!({"Title": "Mostly Harmless"})).await?;
//! ```
//!
//! # Searching
//!
//! ```ignore
//! use docket_index::SearchCriteria;
//!
//! engine.refresh()?;
//! let result = engine.search(&SearchCriteria::for_query("harmless")).await?;
//! ```

#![warn(missing_docs)]

mod analyzer;
mod collector;
mod criteria;
mod cursor;
mod database;
mod docvalues;
mod engine;
mod error;
mod executor;
mod facets;
mod highlight;
mod mapper;
pub mod query;
mod reader;
mod schema;
mod settings;
mod store;
mod writer;

pub use analyzer::{AnalyzerKind, FULL_TEXT_TOKENIZER, build_full_text_analyzer, route_field};
pub use criteria::{FacetValue, SearchCriteria, SearchHit, SearchResult};
pub use cursor::SearchCursor;
pub use database::Database;
pub use engine::CollectionEngine;
pub use error::IndexError;
pub use mapper::{DocumentMapper, MappedDocument};
pub use reader::SearcherManager;
pub use schema::IndexSchema;
pub use settings::IndexSettings;
pub use store::{FileSchemaStore, SchemaStore};
