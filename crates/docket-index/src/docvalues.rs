//! Result projection from grouping columns.
//!
//! When a caller asks for specific fields (`select=`), the engine does not
//! go back to the document store: it materializes the requested values from
//! the `__<name>_grouping__` fast columns the mapper wrote, converting each
//! column back to its original data type from the schema. Multi-valued
//! columns come back as arrays. Object fields (and arrays of objects) are
//! not projectable this way.

use docket_document::{
    DataType, Document, ID_FIELD, Schema, SchemaField, Value, datetime_from_ticks,
};
use docket_query::QueryError;
use tantivy::{DocAddress, Searcher};
use uuid::Uuid;

use crate::{
    IndexError,
    schema::{ID_COLUMN, grouping_path, keyword_column, null_path},
};

/// Reads stored column values back into typed document values.
pub struct DocValuesReader<'a> {
    /// The point-in-time view to read from.
    searcher: &'a Searcher,
    /// The collection schema for type resolution.
    schema: &'a Schema,
}

impl<'a> DocValuesReader<'a> {
    /// Creates a reader over an acquired searcher.
    pub fn new(searcher: &'a Searcher, schema: &'a Schema) -> Self {
        Self { searcher, schema }
    }

    /// Projects the requested fields of one hit into a document.
    ///
    /// `fields` containing a single `*` selects every projectable field in
    /// the schema.
    pub fn read(&self, address: DocAddress, fields: &[String]) -> Result<Document, IndexError> {
        let names: Vec<String> = if fields.len() == 1 && fields[0] == "*" {
            self.projectable_fields()
        } else {
            fields.to_vec()
        };

        let mut doc = Document::new();
        for name in &names {
            if name == ID_FIELD {
                if let Some(id) = self.read_id(address)? {
                    doc.set(ID_FIELD, Value::Guid(id));
                }
                continue;
            }

            let field = self.schema.find_field(name).ok_or_else(|| {
                IndexError::Query(QueryError::compile(format!("unknown field: {name}")))
            })?;

            if let Some(value) = self.read_field(address, &field)? {
                doc.set(name.clone(), value);
            }
        }
        Ok(doc)
    }

    /// Reads the document guid from the id column.
    pub fn read_id(&self, address: DocAddress) -> Result<Option<Uuid>, IndexError> {
        let segment = self.searcher.segment_reader(address.segment_ord);
        let column = segment
            .fast_fields()
            .str(ID_COLUMN)
            .map_err(|e| IndexError::Write(e.to_string()))?;
        let Some(column) = column else {
            return Ok(None);
        };
        let Some(ord) = column.term_ords(address.doc_id).next() else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        column
            .ord_to_bytes(ord, &mut bytes)
            .map_err(|e| IndexError::Write(e.to_string()))?;
        Ok(Uuid::parse_str(&String::from_utf8_lossy(&bytes)).ok())
    }

    /// Reads one schema field's value(s) for a hit.
    fn read_field(
        &self,
        address: DocAddress,
        field: &SchemaField,
    ) -> Result<Option<Value>, IndexError> {
        let element_type = match field.data_type {
            DataType::Object => {
                return Err(IndexError::Query(QueryError::compile(format!(
                    "field {} is an object and cannot be selected",
                    field.name
                ))));
            }
            DataType::Array => {
                if field.array_element_data_type == DataType::Object {
                    return Err(IndexError::Query(QueryError::compile(format!(
                        "field {} is an array of objects and cannot be selected",
                        field.name
                    ))));
                }
                field.array_element_data_type
            }
            other => other,
        };

        let column = keyword_column(&grouping_path(&field.name));
        let mut values = self.read_column(address, &column, element_type)?;

        if values.is_empty() {
            // Distinguish an explicit null from an absent field.
            if self.has_null_marker(address, &field.name)? {
                return Ok(Some(Value::Null));
            }
            return Ok(None);
        }

        if field.data_type == DataType::Array {
            Ok(Some(Value::Array(values)))
        } else {
            Ok(Some(values.remove(0)))
        }
    }

    /// Reads every value in a grouping column for one document.
    fn read_column(
        &self,
        address: DocAddress,
        column: &str,
        data_type: DataType,
    ) -> Result<Vec<Value>, IndexError> {
        let segment = self.searcher.segment_reader(address.segment_ord);
        let fast_fields = segment.fast_fields();
        let doc = address.doc_id;

        let values = match data_type {
            DataType::Number => match fast_fields.f64(column) {
                Ok(col) => col.values_for_doc(doc).map(Value::Number).collect(),
                Err(_) => Vec::new(),
            },
            DataType::Boolean => match fast_fields.u64(column) {
                Ok(col) => col.values_for_doc(doc).map(|v| Value::Bool(v != 0)).collect(),
                Err(_) => Vec::new(),
            },
            DataType::DateTime => match fast_fields.u64(column) {
                Ok(col) => col
                    .values_for_doc(doc)
                    .filter_map(|v| datetime_from_ticks(v as i64))
                    .map(Value::DateTime)
                    .collect(),
                Err(_) => Vec::new(),
            },
            DataType::Text | DataType::Guid => match fast_fields.str(column) {
                Ok(Some(col)) => {
                    let mut out = Vec::new();
                    for ord in col.term_ords(doc) {
                        let mut bytes = Vec::new();
                        if col.ord_to_bytes(ord, &mut bytes).is_ok() {
                            let s = String::from_utf8_lossy(&bytes).into_owned();
                            out.push(if data_type == DataType::Guid {
                                Uuid::parse_str(&s)
                                    .map(Value::Guid)
                                    .unwrap_or(Value::Text(s))
                            } else {
                                Value::Text(s)
                            });
                        }
                    }
                    out
                }
                _ => Vec::new(),
            },
            DataType::Null => Vec::new(),
            DataType::Array | DataType::Object => unreachable!("resolved by read_field"),
        };

        Ok(values)
    }

    /// True when the document carries the field's null marker.
    fn has_null_marker(&self, address: DocAddress, name: &str) -> Result<bool, IndexError> {
        let segment = self.searcher.segment_reader(address.segment_ord);
        let column = keyword_column(&null_path(name));
        match segment.fast_fields().u64(&column) {
            Ok(col) => Ok(col.first(address.doc_id).is_some()),
            Err(_) => Ok(false),
        }
    }

    /// Every schema field a `select=*` can project: scalar leaves and
    /// arrays of scalars, metadata included (minus the synthesized
    /// full-text field).
    fn projectable_fields(&self) -> Vec<String> {
        let mut names = vec![ID_FIELD.to_string()];
        collect_projectable(self.schema, &mut names);
        names
    }
}

/// Recursive worker for `projectable_fields`.
fn collect_projectable(schema: &Schema, names: &mut Vec<String>) {
    for field in schema.snapshot() {
        match field.data_type {
            DataType::Object => {
                if let Some(child) = field.object_schema.as_deref() {
                    collect_projectable(child, names);
                }
            }
            DataType::Array if field.array_element_data_type == DataType::Object => {}
            DataType::Null => {}
            _ => {
                if field.name != ID_FIELD && field.name != docket_document::FULL_TEXT_FIELD {
                    names.push(field.name.clone());
                }
            }
        }
    }
}
