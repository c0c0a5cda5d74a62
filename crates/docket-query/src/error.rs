//! Query error type.
//!
//! One error type covers the whole query path: tokenization, parsing, and
//! the schema-aware compilation that happens in the index crate. Errors
//! carry the offending query and a byte position where one is known, and
//! render with a caret pointing at the problem.

use std::{error::Error, fmt};

/// What stage of query processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The query text itself is malformed (lexing or parsing).
    Syntax,
    /// The construct is well formed but not supported where it appeared.
    Unsupported,
    /// The query references the schema in an invalid way (unknown field,
    /// unparsable literal for the field's type, bad facet).
    Compile,
}

/// An error from query parsing or compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    /// Failure stage.
    kind: QueryErrorKind,
    /// Human-readable description naming the offending substring.
    message: String,
    /// Byte offset into the query where the problem starts, when known.
    position: Option<usize>,
    /// The original query string, when known.
    query: Option<String>,
}

impl QueryError {
    /// Creates a syntax error at a byte position.
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self {
            kind: QueryErrorKind::Syntax,
            message: message.into(),
            position: Some(position),
            query: None,
        }
    }

    /// Creates an unsupported-construct error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Unsupported,
            message: message.into(),
            position: None,
            query: None,
        }
    }

    /// Creates a compile error (schema-aware stage).
    pub fn compile(message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Compile,
            message: message.into(),
            position: None,
            query: None,
        }
    }

    /// Attaches the original query string for display.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Returns the failure stage.
    pub fn kind(&self) -> QueryErrorKind {
        self.kind
    }

    /// Returns the bare message without context lines.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the byte position, when known.
    pub fn position(&self) -> Option<usize> {
        self.position
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            QueryErrorKind::Syntax => "query syntax error",
            QueryErrorKind::Unsupported => "unsupported query construct",
            QueryErrorKind::Compile => "query error",
        };
        write!(f, "{prefix}: {}", self.message)?;

        if let Some(query) = &self.query {
            writeln!(f)?;
            writeln!(f, "  {query}")?;
            if let Some(pos) = self.position {
                let clamped = pos.min(query.len());
                write!(f, "  {}^", " ".repeat(clamped))?;
            }
        }
        Ok(())
    }
}

impl Error for QueryError {}
