//! Document mapping: dynamic values to index columns.
//!
//! The mapper walks a whole document, extends the collection schema on
//! first-seen fields, and lowers every value into the fixed index layout:
//!
//! - `Text` values land in the tokenized column family under their path
//! - other scalars land in the raw family with their exact-match encoding
//!   (guids lowercased, numbers as doubles, booleans as 0/1, timestamps as
//!   ticks)
//! - each mapped scalar is shadowed by a `__<name>_grouping__` column (and
//!   a `__<name>_sort__` column when the field is sortable); explicit nulls
//!   leave only a `__<name>_null__` marker carrying the constant 1
//! - arrays recurse element by element, objects field by field
//!
//! Mapping failures are per-field: a bad name, a type conflict, or a nested
//! array drops that field with a warning and the insert carries on.

use std::collections::BTreeMap;

use docket_document::{
    Document, FULL_TEXT_FIELD, ID_FIELD, Schema, SchemaField, TypeCheck, Value, datetime_to_ticks,
    is_valid_field_name,
};
use serde_json::json;
use tantivy::TantivyDocument;
use tracing::warn;

use crate::{
    IndexError,
    facets::build_labels,
    schema::{
        FACETS_COLUMN, FULL_TEXT_COLUMN, ID_COLUMN, IndexSchema, KEYWORD_COLUMN, TEXT_COLUMN,
    },
};

/// Byte cap on sort and grouping columns for text values.
const MAX_COLUMN_BYTES: usize = 256;

/// Entries contributed to one level of the two JSON column families.
#[derive(Debug, Default)]
struct MappedValue {
    /// Entries for the tokenized family at the parent level.
    text: BTreeMap<String, serde_json::Value>,
    /// Entries for the raw family at the parent level.
    keyword: BTreeMap<String, serde_json::Value>,
}

impl MappedValue {
    /// True when the value produced nothing (it was dropped).
    fn is_empty(&self) -> bool {
        self.text.is_empty() && self.keyword.is_empty()
    }
}

/// A document lowered to its tantivy form.
pub struct MappedDocument {
    /// The ready-to-write tantivy document.
    pub doc: TantivyDocument,
    /// True when mapping added fields to the schema or fixed a data type,
    /// so the schema needs re-persisting.
    pub schema_changed: bool,
}

/// Lowers documents into tantivy documents against a live schema.
pub struct DocumentMapper {
    /// Index field handles.
    index_schema: IndexSchema,
    /// Facet-enable new child fields (mirrors the engine setting).
    auto_facet: bool,
}

impl DocumentMapper {
    /// Creates a mapper over the given index schema.
    pub fn new(index_schema: IndexSchema, auto_facet: bool) -> Self {
        Self {
            index_schema,
            auto_facet,
        }
    }

    /// Maps one document, extending `schema` as a side effect.
    ///
    /// Schema extension happens before the tantivy document is assembled,
    /// so by the time the write lands every field it mentions is installed.
    pub fn map(&self, doc: &Document, schema: &Schema) -> Result<MappedDocument, IndexError> {
        let id = doc.id().ok_or(docket_document::SchemaError::MissingId)?;

        let mut changed = false;
        let mut text_root = BTreeMap::new();
        let mut keyword_root = BTreeMap::new();

        for (name, value) in doc.iter() {
            if name == ID_FIELD {
                continue;
            }
            if name == FULL_TEXT_FIELD {
                warn!(field = %name, "client-supplied full-text field ignored");
                continue;
            }
            if !is_valid_field_name(name) {
                warn!(field = %name, "illegal characters in field name, skipping");
                continue;
            }

            let existed = schema.get(name).is_some();
            let mut field = schema.get_or_create(name);
            changed |= !existed;

            let mapped = self.map_value(&mut field, name, value, &mut changed);
            drop(field);

            for (key, entry) in mapped.text {
                text_root.insert(key, entry);
            }
            for (key, entry) in mapped.keyword {
                keyword_root.insert(key, entry);
            }
        }

        let mut facet_labels: Vec<String> = Vec::new();
        for field in schema.facet_fields() {
            for label in build_labels(doc, &field) {
                facet_labels.push(label.to_path_string());
            }
        }

        let doc_json = json!({
            ID_COLUMN: id.as_hyphenated().to_string(),
            FULL_TEXT_COLUMN: doc.full_text(),
            TEXT_COLUMN: serde_json::Value::Object(text_root.into_iter().collect()),
            KEYWORD_COLUMN: serde_json::Value::Object(keyword_root.into_iter().collect()),
            FACETS_COLUMN: facet_labels,
        });

        let doc = TantivyDocument::parse_json(
            self.index_schema.schema(),
            &serde_json::to_string(&doc_json).map_err(|e| IndexError::Write(e.to_string()))?,
        )
        .map_err(|e| IndexError::Write(e.to_string()))?;

        Ok(MappedDocument {
            doc,
            schema_changed: changed,
        })
    }

    /// Maps one value under one schema field.
    fn map_value(
        &self,
        field: &mut SchemaField,
        name: &str,
        value: &Value,
        changed: &mut bool,
    ) -> MappedValue {
        let leaf = leaf_name(name);
        let mut out = MappedValue::default();

        match field.observe(value.data_type()) {
            TypeCheck::Adopted => *changed = true,
            TypeCheck::Matched => {}
            TypeCheck::Conflict => {
                warn!(
                    field = %name,
                    expected = ?field.data_type,
                    observed = ?value.data_type(),
                    "type conflict, dropping value"
                );
                return out;
            }
        }

        match value {
            Value::Null => {
                out.keyword.insert(null_key(leaf), json!(1_u64));
            }
            Value::Guid(guid) => {
                let encoded = guid.as_hyphenated().to_string();
                out.keyword.insert(leaf.to_string(), json!(encoded));
                out.keyword.insert(grouping_key(leaf), json!(encoded));
                if field.is_sortable() {
                    out.keyword.insert(sort_key(leaf), json!(encoded));
                }
            }
            Value::Text(s) => {
                out.text.insert(leaf.to_string(), json!(s));
                out.keyword
                    .insert(grouping_key(leaf), json!(truncate_bytes(s, MAX_COLUMN_BYTES)));
                if field.is_sortable() {
                    out.keyword.insert(
                        sort_key(leaf),
                        json!(truncate_bytes(&s.to_lowercase(), MAX_COLUMN_BYTES)),
                    );
                }
            }
            Value::Number(n) => {
                let Some(encoded) = serde_json::Number::from_f64(*n) else {
                    warn!(field = %name, "non-finite number, dropping value");
                    return MappedValue::default();
                };
                let encoded = serde_json::Value::Number(encoded);
                out.keyword.insert(leaf.to_string(), encoded.clone());
                out.keyword.insert(grouping_key(leaf), encoded.clone());
                if field.is_sortable() {
                    out.keyword.insert(sort_key(leaf), encoded);
                }
            }
            Value::Bool(b) => {
                let encoded = json!(u64::from(*b));
                out.keyword.insert(leaf.to_string(), encoded.clone());
                out.keyword.insert(grouping_key(leaf), encoded.clone());
                if field.is_sortable() {
                    out.keyword.insert(sort_key(leaf), encoded);
                }
            }
            Value::DateTime(dt) => {
                let encoded = json!(datetime_to_ticks(dt) as u64);
                out.keyword.insert(leaf.to_string(), encoded.clone());
                out.keyword.insert(grouping_key(leaf), encoded.clone());
                if field.is_sortable() {
                    out.keyword.insert(sort_key(leaf), encoded);
                }
            }
            Value::Array(items) => {
                self.map_array(field, name, items, changed, &mut out);
            }
            Value::Object(map) => {
                self.map_object(field, name, map, changed, &mut out);
            }
        }

        out
    }

    /// Maps an array element by element into multi-valued columns.
    fn map_array(
        &self,
        field: &mut SchemaField,
        name: &str,
        items: &[Value],
        changed: &mut bool,
        out: &mut MappedValue,
    ) {
        let leaf = leaf_name(name);
        let mut text_values = Vec::new();
        let mut keyword_values = Vec::new();
        let mut grouping_values = Vec::new();
        let mut text_objects = Vec::new();
        let mut keyword_objects = Vec::new();

        for item in items {
            if matches!(item, Value::Array(_)) {
                warn!(field = %name, "nested arrays are not supported, dropping element");
                continue;
            }
            if matches!(item, Value::Null) {
                continue;
            }
            match field.observe_element(item.data_type()) {
                TypeCheck::Adopted => *changed = true,
                TypeCheck::Matched => {}
                TypeCheck::Conflict => {
                    warn!(
                        field = %name,
                        expected = ?field.array_element_data_type,
                        observed = ?item.data_type(),
                        "mixed-type array, dropping element"
                    );
                    continue;
                }
            }

            match item {
                Value::Text(s) => {
                    text_values.push(json!(s));
                    grouping_values.push(json!(truncate_bytes(s, MAX_COLUMN_BYTES)));
                }
                Value::Guid(guid) => {
                    let encoded = json!(guid.as_hyphenated().to_string());
                    keyword_values.push(encoded.clone());
                    grouping_values.push(encoded);
                }
                Value::Number(n) => {
                    if let Some(encoded) = serde_json::Number::from_f64(*n) {
                        let encoded = serde_json::Value::Number(encoded);
                        keyword_values.push(encoded.clone());
                        grouping_values.push(encoded);
                    }
                }
                Value::Bool(b) => {
                    let encoded = json!(u64::from(*b));
                    keyword_values.push(encoded.clone());
                    grouping_values.push(encoded);
                }
                Value::DateTime(dt) => {
                    let encoded = json!(datetime_to_ticks(dt) as u64);
                    keyword_values.push(encoded.clone());
                    grouping_values.push(encoded);
                }
                Value::Object(map) => {
                    let mut element = MappedValue::default();
                    self.map_object(field, name, map, changed, &mut element);
                    // map_object nests the element under the leaf key.
                    if let Some(serde_json::Value::Object(obj)) = element.text.remove(leaf) {
                        text_objects.push(serde_json::Value::Object(obj));
                    }
                    if let Some(serde_json::Value::Object(obj)) = element.keyword.remove(leaf) {
                        keyword_objects.push(serde_json::Value::Object(obj));
                    }
                }
                Value::Null | Value::Array(_) => unreachable!("filtered above"),
            }
        }

        if !text_values.is_empty() {
            out.text.insert(leaf.to_string(), json!(text_values));
        }
        if !text_objects.is_empty() {
            out.text.insert(leaf.to_string(), json!(text_objects));
        }
        if !keyword_values.is_empty() {
            out.keyword.insert(leaf.to_string(), json!(keyword_values));
        }
        if !keyword_objects.is_empty() {
            out.keyword.insert(leaf.to_string(), json!(keyword_objects));
        }
        if !grouping_values.is_empty() {
            out.keyword.insert(grouping_key(leaf), json!(grouping_values));
        }
    }

    /// Maps a nested object field by field under the parent's path.
    fn map_object(
        &self,
        field: &mut SchemaField,
        name: &str,
        map: &BTreeMap<String, Value>,
        changed: &mut bool,
        out: &mut MappedValue,
    ) {
        let leaf = leaf_name(name);
        let child_schema = field.child_schema(self.auto_facet);

        let mut text_children = BTreeMap::new();
        let mut keyword_children = BTreeMap::new();

        for (child_key, child_value) in map {
            if !is_valid_field_name(child_key) {
                warn!(field = %child_key, "illegal characters in field name, skipping");
                continue;
            }
            let child_name = format!("{name}.{child_key}");
            let existed = child_schema.get(&child_name).is_some();
            let mut child_field = child_schema.get_or_create(&child_name);
            *changed |= !existed;

            let mapped = self.map_value(&mut child_field, &child_name, child_value, changed);
            drop(child_field);

            if mapped.is_empty() {
                continue;
            }
            text_children.extend(mapped.text);
            keyword_children.extend(mapped.keyword);
        }

        if !text_children.is_empty() {
            out.text.insert(
                leaf.to_string(),
                serde_json::Value::Object(text_children.into_iter().collect()),
            );
        }
        if !keyword_children.is_empty() {
            out.keyword.insert(
                leaf.to_string(),
                serde_json::Value::Object(keyword_children.into_iter().collect()),
            );
        }
    }
}

/// Last segment of a dotted path.
fn leaf_name(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, leaf)| leaf)
}

/// Grouping column key for a leaf name.
fn grouping_key(leaf: &str) -> String {
    format!("__{leaf}_grouping__")
}

/// Sort column key for a leaf name.
fn sort_key(leaf: &str) -> String {
    format!("__{leaf}_sort__")
}

/// Null-marker column key for a leaf name.
fn null_key(leaf: &str) -> String {
    format!("__{leaf}_null__")
}

/// Truncates to a byte budget on a character boundary.
fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
