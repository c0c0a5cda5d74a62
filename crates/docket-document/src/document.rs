//! Documents and reserved field handling.

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::{SchemaError, Value};

/// Reserved field holding the document guid.
pub const ID_FIELD: &str = "_id";

/// Reserved field stamped when a document is first inserted.
pub const CREATED_FIELD: &str = "_createdTimestamp";

/// Reserved field stamped on every write.
pub const MODIFIED_FIELD: &str = "_modifiedTimestamp";

/// Synthesized full-text field. Never surfaced to clients.
pub const FULL_TEXT_FIELD: &str = "_full_text_";

/// Characters that may not appear in field names.
///
/// These collide with the query language or the index path encoding, so a
/// field carrying one of them is skipped at mapping time.
const ILLEGAL_FIELD_CHARS: &str = "+&|!(){}[]^\"~*?:\\/";

/// Returns true if `name` is one of the reserved metadata fields.
pub fn is_metadata_field(name: &str) -> bool {
    matches!(name, ID_FIELD | CREATED_FIELD | MODIFIED_FIELD | FULL_TEXT_FIELD)
}

/// Returns true if `name` is usable as a field name.
pub fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || ILLEGAL_FIELD_CHARS.contains(c))
}

/// A schemaless document: an ordered mapping from field name to value.
///
/// Three reserved metadata fields are always present once a document has
/// passed through the engine: [`ID_FIELD`], [`CREATED_FIELD`], and
/// [`MODIFIED_FIELD`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Field name to value.
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a document from a JSON object.
    ///
    /// Values go through the intake coercions of [`Value::from_json`].
    /// Anything other than a JSON object is rejected.
    pub fn from_json(json: serde_json::Value) -> Result<Self, SchemaError> {
        match Value::from_json(json) {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(SchemaError::NotAnObject(other.data_type())),
        }
    }

    /// Renders the document as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Object(self.fields.clone()).to_json()
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Resolves a dotted path (`parent.child.leaf`) into nested objects.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Removes a field and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Returns the document guid, if present and well typed.
    pub fn id(&self) -> Option<Uuid> {
        self.fields.get(ID_FIELD).and_then(Value::as_guid)
    }

    /// Ensures the document has a guid `_id`, minting a fresh v4 when absent.
    ///
    /// An existing `_id` of any other data type is an error: the id slot is
    /// a guid forever.
    pub fn ensure_id(&mut self) -> Result<Uuid, SchemaError> {
        match self.fields.get(ID_FIELD) {
            Some(Value::Guid(guid)) => Ok(*guid),
            Some(other) => Err(SchemaError::InvalidId(other.data_type())),
            None => {
                let guid = Uuid::new_v4();
                self.fields.insert(ID_FIELD.to_string(), Value::Guid(guid));
                Ok(guid)
            }
        }
    }

    /// Stamps the modification timestamp, and the creation timestamp too
    /// when `fresh` is set (insert path).
    pub fn touch(&mut self, fresh: bool) {
        let now = Value::DateTime(Utc::now());
        if fresh || !matches!(self.fields.get(CREATED_FIELD), Some(Value::DateTime(_))) {
            self.fields.insert(CREATED_FIELD.to_string(), now.clone());
        }
        self.fields.insert(MODIFIED_FIELD.to_string(), now);
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of fields, reserved ones included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Joins the plain-text projection of every non-metadata value with
    /// newlines. This is the content of the synthesized full-text field.
    pub fn full_text(&self) -> String {
        let mut parts = Vec::new();
        for (name, value) in &self.fields {
            if !is_metadata_field(name) {
                value.append_projection(&mut parts);
            }
        }
        parts.join("\n")
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
