//! Sort specification parsing and compilation.
//!
//! Two grammars arrive from the search surface: the multi-field form
//! `fieldA:asc,fieldB:desc` and the single-field form with a sign prefix
//! (`-Title` for descending, `+Title`/`Title` for ascending). Both compile
//! to descriptors over the `__<name>_sort__` columns.
//!
//! Unknown or unsortable sort fields are always an error; there is no
//! silent fall-back to relevance order.

use docket_document::{DataType, ID_FIELD, Schema};
use docket_query::QueryError;

use crate::schema::{ID_COLUMN, keyword_column, sort_path};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first; missing values last.
    Ascending,
    /// Largest first; missing values first.
    Descending,
}

/// One requested sort field, before schema resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Field name as given.
    pub name: String,
    /// Requested direction.
    pub order: SortOrder,
}

/// The fast-column type a compiled sort reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKind {
    /// Doubles (numbers).
    F64,
    /// Unsigned integers (booleans, timestamp ticks).
    U64,
    /// Byte strings (text, guids).
    Str,
}

/// A sort descriptor resolved against the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSort {
    /// Fast-field column address.
    pub column: String,
    /// Column type to read.
    pub kind: SortKind,
    /// True for descending.
    pub descending: bool,
}

/// Parses a sort specification.
///
/// Accepts `a:asc,b:desc` (direction defaults to ascending) and the signed
/// single-field form `-a` / `+a` / `a`.
pub fn parse_sort_spec(spec: &str) -> Result<Vec<SortField>, QueryError> {
    let mut fields = Vec::new();
    for raw in spec.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let field = if let Some((name, order)) = raw.split_once(':') {
            let order = match order.trim().to_ascii_lowercase().as_str() {
                "asc" => SortOrder::Ascending,
                "desc" => SortOrder::Descending,
                other => {
                    return Err(QueryError::compile(format!(
                        "invalid sort direction {other:?} (expected asc or desc)"
                    )));
                }
            };
            SortField {
                name: name.trim().to_string(),
                order,
            }
        } else if let Some(name) = raw.strip_prefix('-') {
            SortField {
                name: name.trim().to_string(),
                order: SortOrder::Descending,
            }
        } else {
            let name = raw.strip_prefix('+').unwrap_or(raw);
            SortField {
                name: name.trim().to_string(),
                order: SortOrder::Ascending,
            }
        };

        if field.name.is_empty() {
            return Err(QueryError::compile("empty sort field name"));
        }
        fields.push(field);
    }
    Ok(fields)
}

/// Resolves requested sort fields against the schema.
pub fn compile_sorts(fields: &[SortField], schema: &Schema) -> Result<Vec<CompiledSort>, QueryError> {
    fields
        .iter()
        .map(|field| {
            if field.name == ID_FIELD {
                return Ok(CompiledSort {
                    column: ID_COLUMN.to_string(),
                    kind: SortKind::Str,
                    descending: field.order == SortOrder::Descending,
                });
            }

            let resolved = schema
                .find_field(&field.name)
                .ok_or_else(|| QueryError::compile(format!("unknown sort field: {}", field.name)))?;
            if !resolved.is_sortable() {
                return Err(QueryError::compile(format!(
                    "field {} is not sortable",
                    field.name
                )));
            }

            let kind = match resolved.data_type {
                DataType::Number => SortKind::F64,
                DataType::Boolean | DataType::DateTime => SortKind::U64,
                DataType::Text | DataType::Guid => SortKind::Str,
                DataType::Null => {
                    return Err(QueryError::compile(format!(
                        "field {} has no data type yet and cannot be sorted on",
                        field.name
                    )));
                }
                DataType::Array | DataType::Object => {
                    return Err(QueryError::compile(format!(
                        "field {} is not sortable",
                        field.name
                    )));
                }
            };

            Ok(CompiledSort {
                column: keyword_column(&sort_path(&field.name)),
                kind,
                descending: field.order == SortOrder::Descending,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use docket_document::SchemaField;

    use super::*;

    fn schema_with(name: &str, data_type: DataType) -> Schema {
        let schema = Schema::with_defaults("books", false);
        schema.try_add(SchemaField::with_type(name, data_type));
        schema
    }

    #[test]
    fn parses_multi_field_spec() {
        let fields = parse_sort_spec("Price:asc,Title:desc").unwrap();
        assert_eq!(
            fields,
            vec![
                SortField {
                    name: "Price".into(),
                    order: SortOrder::Ascending
                },
                SortField {
                    name: "Title".into(),
                    order: SortOrder::Descending
                },
            ]
        );
    }

    #[test]
    fn direction_defaults_to_ascending() {
        let fields = parse_sort_spec("Price").unwrap();
        assert_eq!(fields[0].order, SortOrder::Ascending);
    }

    #[test]
    fn signed_single_field_form() {
        assert_eq!(
            parse_sort_spec("-Title").unwrap()[0],
            SortField {
                name: "Title".into(),
                order: SortOrder::Descending
            }
        );
        assert_eq!(
            parse_sort_spec("+Title").unwrap()[0].order,
            SortOrder::Ascending
        );
    }

    #[test]
    fn invalid_direction_errors() {
        assert!(parse_sort_spec("Price:sideways").is_err());
    }

    #[test]
    fn compiles_each_scalar_kind() {
        for (data_type, kind) in [
            (DataType::Number, SortKind::F64),
            (DataType::Boolean, SortKind::U64),
            (DataType::DateTime, SortKind::U64),
            (DataType::Text, SortKind::Str),
            (DataType::Guid, SortKind::Str),
        ] {
            let schema = schema_with("X", data_type);
            let compiled =
                compile_sorts(&parse_sort_spec("X:desc").unwrap(), &schema).unwrap();
            assert_eq!(compiled[0].kind, kind, "{data_type:?}");
            assert_eq!(compiled[0].column, "_kw_.__X_sort__");
            assert!(compiled[0].descending);
        }
    }

    #[test]
    fn id_sorts_on_the_dedicated_column() {
        let schema = Schema::with_defaults("books", false);
        let compiled = compile_sorts(&parse_sort_spec("_id").unwrap(), &schema).unwrap();
        assert_eq!(compiled[0].column, "_id");
        assert_eq!(compiled[0].kind, SortKind::Str);
    }

    #[test]
    fn unknown_field_fails() {
        let schema = Schema::with_defaults("books", false);
        let err = compile_sorts(&parse_sort_spec("Nope").unwrap(), &schema).unwrap_err();
        assert!(err.message().contains("unknown sort field"));
    }

    #[test]
    fn unsortable_fields_fail() {
        let schema = schema_with("Tags", DataType::Array);
        assert!(compile_sorts(&parse_sort_spec("Tags").unwrap(), &schema).is_err());

        let schema = Schema::with_defaults("books", false);
        schema.try_add(SchemaField::with_type("Address.City", DataType::Text));
        // A dotted name resolves but is not top level.
        let err = compile_sorts(&parse_sort_spec("Address.City").unwrap(), &schema).unwrap_err();
        assert!(err.message().contains("not sortable"));
    }
}
