//! Dynamic document model for docket.
//!
//! This crate defines the pieces of the engine that exist independently of
//! the search index:
//! - [`Value`]: a tagged dynamic value covering the JSON-compatible data
//!   types (plus guids and UTC timestamps inferred from strings)
//! - [`Document`]: an ordered bag of named values with reserved metadata
//!   fields (`_id`, `_createdTimestamp`, `_modifiedTimestamp`)
//! - [`Schema`]: the live, add-only description of every field ever seen in
//!   a collection, grown concurrently as documents arrive
//!
//! The schema is never declared upfront: the first non-null value observed
//! for a field fixes its [`DataType`] for the lifetime of the collection.

#![warn(missing_docs)]

mod document;
mod error;
mod schema;
mod value;

pub use document::{
    CREATED_FIELD, Document, FULL_TEXT_FIELD, ID_FIELD, MODIFIED_FIELD, is_metadata_field,
    is_valid_field_name,
};
pub use error::SchemaError;
pub use schema::{DataType, FacetSettings, Schema, SchemaField, TypeCheck};
pub use value::{MAX_TICKS, MIN_TICKS, Value, datetime_from_ticks, datetime_to_ticks, parse_datetime};
