//! Error types for the document model.

use thiserror::Error;

use crate::schema::DataType;

/// Errors raised by document intake and schema maintenance.
///
/// During writes these are logged and the offending field is skipped; only
/// queries that reference a broken field surface them to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The document body was not a JSON object.
    #[error("document must be a JSON object, got {0:?}")]
    NotAnObject(DataType),

    /// The document has no `_id` field where one is required.
    #[error("document has no _id field")]
    MissingId,

    /// The `_id` field held something other than a guid.
    #[error("_id must be a guid, got {0:?}")]
    InvalidId(DataType),

    /// A value did not match the data type already fixed for its field.
    #[error("field {field}: expected {expected:?}, got {observed:?}")]
    TypeConflict {
        /// Full dotted field name.
        field: String,
        /// The data type fixed in the schema.
        expected: DataType,
        /// The data type of the offending value.
        observed: DataType,
    },

    /// A field name contained a forbidden character.
    #[error("field name {0:?} contains illegal characters")]
    IllegalFieldName(String),

    /// An array nested directly inside another array.
    #[error("field {0}: nested arrays are not supported")]
    NestedArray(String),

    /// A write tried to replace a reserved metadata field.
    #[error("field {0} is reserved")]
    ReservedField(String),
}
