//! Schema-aware query compilation.
//!
//! [`docket_query`] turns the query string into an AST; this module lowers
//! that AST onto the index layout, coercing every literal to the encoded
//! form of its target field's data type, and compiles sort specifications
//! onto the sort columns.

mod compile;
mod sort;

pub use compile::QueryCompiler;
pub use sort::{CompiledSort, SortField, SortKind, SortOrder, compile_sorts, parse_sort_spec};
