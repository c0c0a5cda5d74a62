//! Index schema for docket collections.
//!
//! A collection's schema evolves, but a tantivy schema is frozen when the
//! index is created, so the dynamic field model is realized with a fixed
//! five-field layout and dynamic JSON paths inside it:
//!
//! - `_id`: document guid (raw token, stored, fast)
//! - `_full_text_`: the synthesized projection of all user values
//!   (tokenized with positions, stored for the highlighter)
//! - `_text_`: JSON field carrying every `Text` value under its dotted
//!   path, analyzed by the full-text pipeline
//! - `_kw_`: JSON field carrying exact-match encodings (guids, doubles,
//!   booleans as 0/1, timestamps as ticks) plus the auxiliary sort,
//!   grouping, and null-marker columns; raw-tokenized and fast
//! - `_facets_`: hierarchical facet labels, first path segment = facet name
//!
//! Auxiliary column naming follows fixed conventions the query compiler and
//! result projection depend on: `__<name>_sort__` (top-level sortable
//! fields), `__<name>_grouping__`, and `__<name>_null__`, each nested next
//! to the value it shadows.

use tantivy::schema::{
    FAST, FacetOptions, Field, IndexRecordOption, JsonObjectOptions, STORED, STRING,
    Schema as TantivySchema, TextFieldIndexing, TextOptions,
};

use crate::analyzer::FULL_TEXT_TOKENIZER;

/// Tantivy field name of the document guid.
pub const ID_COLUMN: &str = "_id";

/// Tantivy field name of the synthesized full-text projection.
pub const FULL_TEXT_COLUMN: &str = "_full_text_";

/// Tantivy field name of the tokenized JSON column family.
pub const TEXT_COLUMN: &str = "_text_";

/// Tantivy field name of the raw JSON column family.
pub const KEYWORD_COLUMN: &str = "_kw_";

/// Tantivy field name of the facet field.
pub const FACETS_COLUMN: &str = "_facets_";

/// Handles to the fields of the index schema.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// The underlying tantivy schema.
    schema: TantivySchema,
    /// Document guid.
    pub id: Field,
    /// Synthesized full-text projection.
    pub full_text: Field,
    /// Tokenized JSON column family.
    pub text: Field,
    /// Raw JSON column family (values and auxiliary columns).
    pub keyword: Field,
    /// Hierarchical facet labels.
    pub facets: Field,
}

impl IndexSchema {
    /// Creates the fixed collection schema.
    pub fn new() -> Self {
        let mut builder = TantivySchema::builder();

        let id = builder.add_text_field(ID_COLUMN, STRING | STORED | FAST);

        let full_text_indexing = TextFieldIndexing::default()
            .set_tokenizer(FULL_TEXT_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let full_text = builder.add_text_field(
            FULL_TEXT_COLUMN,
            TextOptions::default()
                .set_indexing_options(full_text_indexing.clone())
                .set_stored(),
        );

        let text_options = JsonObjectOptions::default()
            .set_stored()
            .set_expand_dots_enabled()
            .set_indexing_options(full_text_indexing);
        let text = builder.add_json_field(TEXT_COLUMN, text_options);

        let keyword_indexing = TextFieldIndexing::default()
            .set_tokenizer("raw")
            .set_index_option(IndexRecordOption::Basic);
        let keyword_options = JsonObjectOptions::default()
            .set_stored()
            .set_expand_dots_enabled()
            .set_indexing_options(keyword_indexing)
            .set_fast(Some("raw"));
        let keyword = builder.add_json_field(KEYWORD_COLUMN, keyword_options);

        let facets = builder.add_facet_field(FACETS_COLUMN, FacetOptions::default());

        let schema = builder.build();

        Self {
            schema,
            id,
            full_text,
            text,
            keyword,
            facets,
        }
    }

    /// Returns a reference to the underlying tantivy schema.
    pub fn schema(&self) -> &TantivySchema {
        &self.schema
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a dotted path into its parent segments and leaf name.
fn split_leaf(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", name),
    }
}

/// Builds an auxiliary path next to the named field: for `a.b` and marker
/// `sort` this is `a.__b_sort__`.
fn aux_path(name: &str, marker: &str) -> String {
    let (parent, leaf) = split_leaf(name);
    if parent.is_empty() {
        format!("__{leaf}_{marker}__")
    } else {
        format!("{parent}.__{leaf}_{marker}__")
    }
}

/// Path of the sort column shadowing a (top-level) field.
pub fn sort_path(name: &str) -> String {
    aux_path(name, "sort")
}

/// Path of the grouping column shadowing a field.
pub fn grouping_path(name: &str) -> String {
    aux_path(name, "grouping")
}

/// Path of the null-marker column shadowing a field.
pub fn null_path(name: &str) -> String {
    aux_path(name, "null")
}

/// Fast-field address of a path inside the raw column family.
pub fn keyword_column(path: &str) -> String {
    format!("{KEYWORD_COLUMN}.{path}")
}
