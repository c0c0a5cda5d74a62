//! Query language for docket.
//!
//! Parses Lucene-style query strings into an AST:
//!
//! ```text
//! Author:Douglas AND Rating:[7 TO 10] -Category:Drama "grand theme"~ title*
//! ```
//!
//! Supported constructs: bare terms, quoted phrases, `AND`/`OR`/`NOT`
//! keywords (implicit AND between adjacent clauses, `-` negation), grouping,
//! field qualifiers (`field:…`), inclusive `[a TO b]` and exclusive
//! `{a TO b}` ranges, fuzzy `~`/`~N` suffixes, trailing-`*` prefixes, `/…/`
//! regexes, `^n` boosts, and the bare `*` match-all sentinel.
//!
//! This crate knows nothing about schemas or the index: literals stay
//! strings here, and the index-side compiler coerces them per field type.

#![warn(missing_docs)]

mod ast;
mod error;
mod lexer;
mod parser;

pub use ast::{QueryExpr, RangeBound};
pub use error::{QueryError, QueryErrorKind};
pub use parser::parse;
