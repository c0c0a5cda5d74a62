//! Query compiler.
//!
//! Lowers a parsed [`QueryExpr`] onto the index layout. Every literal under
//! a field qualifier is coerced to the encoded form of that field's data
//! type before the tantivy query is built:
//!
//! - `Number` literals parse as doubles
//! - `Boolean` literals become the 0/1 integer encoding
//! - `DateTime` literals parse permissively and become ticks
//! - `Guid` literals are lowercased exact matches
//! - `Text` literals run through the full-text analyzer and match the
//!   tokenized column family
//!
//! The configured null token rewrites to an exact match on the field's
//! null-marker column. Unqualified terms search the synthesized full-text
//! field. Unknown fields, unparsable literals, and fuzzy/prefix/regex
//! operators on non-text fields are compile errors.

use std::ops::Bound;

use docket_document::{
    DataType, FULL_TEXT_FIELD, ID_FIELD, Schema, SchemaField, datetime_to_ticks, parse_datetime,
};
use docket_query::{QueryError, QueryExpr, RangeBound};
use tantivy::{
    Term,
    query::{
        AllQuery, BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RangeQuery,
        RegexQuery, TermQuery,
    },
    schema::IndexRecordOption,
    tokenizer::TextAnalyzer,
};

use crate::{
    analyzer::tokenize,
    schema::{IndexSchema, null_path},
};

/// A compiled clause, or nothing when the literal analyzed away.
type MaybeQuery = Option<Box<dyn Query>>;

/// Compiles query ASTs against a collection schema.
pub struct QueryCompiler<'a> {
    /// Index field handles.
    index_schema: &'a IndexSchema,
    /// The live collection schema.
    schema: &'a Schema,
    /// Full-text analyzer matching the index pipeline.
    analyzer: TextAnalyzer,
    /// Term that selects explicitly-null values.
    null_token: &'a str,
}

impl<'a> QueryCompiler<'a> {
    /// Creates a compiler.
    pub fn new(
        index_schema: &'a IndexSchema,
        schema: &'a Schema,
        analyzer: TextAnalyzer,
        null_token: &'a str,
    ) -> Self {
        Self {
            index_schema,
            schema,
            analyzer,
            null_token,
        }
    }

    /// Parses and compiles a query string.
    ///
    /// Empty and blank queries (and queries whose only literal analyzes
    /// away) rewrite to match-all.
    pub fn compile_str(&mut self, input: &str) -> Result<Box<dyn Query>, QueryError> {
        match docket_query::parse(input)? {
            None => Ok(Box::new(AllQuery)),
            Some(expr) => Ok(self
                .compile(&expr)
                .map_err(|e| e.with_query(input))?
                .unwrap_or_else(|| Box::new(AllQuery))),
        }
    }

    /// Compiles a query expression.
    pub fn compile(&mut self, expr: &QueryExpr) -> Result<MaybeQuery, QueryError> {
        match expr {
            QueryExpr::All => Ok(Some(Box::new(AllQuery))),
            QueryExpr::Term(text) => Ok(self.compile_full_text_term(text)),
            QueryExpr::Phrase(words) => Ok(self.compile_full_text_phrase(words)),
            QueryExpr::Prefix(stem) => self.compile_full_text_prefix(stem),
            QueryExpr::Fuzzy { term, distance } => self.compile_full_text_fuzzy(term, *distance),
            QueryExpr::Regex(pattern) => self.compile_regex(pattern, self.index_schema.full_text),
            QueryExpr::Range { .. } => Err(QueryError::compile(
                "a range requires a field qualifier",
            )),
            QueryExpr::Not(inner) => self.compile_not(inner),
            QueryExpr::And(exprs) => self.compile_and(exprs),
            QueryExpr::Or(exprs) => self.compile_or(exprs),
            QueryExpr::Field { name, expr } => self.compile_field(name, expr),
            QueryExpr::Boost { expr, factor } => self.compile_boost(expr, *factor),
        }
    }

    /// Compiles a boosted expression.
    fn compile_boost(&mut self, expr: &QueryExpr, factor: f32) -> Result<MaybeQuery, QueryError> {
        match self.compile(expr)? {
            Some(inner) => Ok(Some(Box::new(BoostQuery::new(inner, factor)))),
            None => Ok(None),
        }
    }

    /// Compiles a NOT expression.
    ///
    /// A standalone NOT needs a match-all base to exclude from; inside an
    /// AND the split into MUST/MUST_NOT happens in [`Self::compile_and`].
    fn compile_not(&mut self, inner: &QueryExpr) -> Result<MaybeQuery, QueryError> {
        match self.compile(inner)? {
            Some(q) => {
                let clauses = vec![
                    (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                    (Occur::MustNot, q),
                ];
                Ok(Some(Box::new(BooleanQuery::new(clauses))))
            }
            None => Ok(None),
        }
    }

    /// Compiles an AND expression, separating positive and negative
    /// clauses so negations become MUST_NOT instead of nested booleans.
    fn compile_and(&mut self, exprs: &[QueryExpr]) -> Result<MaybeQuery, QueryError> {
        let mut positive: Vec<Box<dyn Query>> = Vec::new();
        let mut negative: Vec<Box<dyn Query>> = Vec::new();

        for expr in exprs {
            match expr {
                QueryExpr::Not(inner) => {
                    if let Some(q) = self.compile(inner)? {
                        negative.push(q);
                    }
                }
                other => {
                    if let Some(q) = self.compile(other)? {
                        positive.push(q);
                    }
                }
            }
        }

        if positive.is_empty() && negative.is_empty() {
            return Ok(None);
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for q in positive {
            clauses.push((Occur::Must, q));
        }
        if clauses.is_empty() {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        }
        for q in negative {
            clauses.push((Occur::MustNot, q));
        }

        Ok(Some(Box::new(BooleanQuery::new(clauses))))
    }

    /// Compiles an OR expression.
    fn compile_or(&mut self, exprs: &[QueryExpr]) -> Result<MaybeQuery, QueryError> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for expr in exprs {
            if let Some(q) = self.compile(expr)? {
                clauses.push((Occur::Should, q));
            }
        }
        if clauses.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Box::new(BooleanQuery::new(clauses))))
        }
    }

    /// Compiles a field-scoped expression.
    fn compile_field(&mut self, name: &str, expr: &QueryExpr) -> Result<MaybeQuery, QueryError> {
        if name == FULL_TEXT_FIELD {
            return self.compile(expr);
        }
        if name == ID_FIELD {
            return self.compile_id_query(expr);
        }

        let field = self
            .schema
            .find_field(name)
            .ok_or_else(|| QueryError::compile(format!("unknown field: {name}")))?;

        self.compile_scoped(&field, expr)
    }

    /// Compiles an expression inside a resolved field's scope.
    fn compile_scoped(
        &mut self,
        field: &SchemaField,
        expr: &QueryExpr,
    ) -> Result<MaybeQuery, QueryError> {
        match expr {
            QueryExpr::Term(text) if text == self.null_token => {
                Ok(Some(self.null_marker_query(&field.name)))
            }
            QueryExpr::Term(text) => self.compile_typed_term(field, text),
            QueryExpr::Phrase(words) => self.compile_typed_phrase(field, words),
            QueryExpr::Range { lower, upper } => self.compile_typed_range(field, lower, upper),
            QueryExpr::Prefix(stem) => {
                self.require_text(field, "prefix")?;
                let Some(token) = self.single_token(stem) else {
                    return Ok(None);
                };
                let term = self.text_term(&field.name, &token);
                Ok(Some(Box::new(FuzzyTermQuery::new_prefix(term, 0, true))))
            }
            QueryExpr::Fuzzy { term, distance } => {
                self.require_text(field, "fuzzy")?;
                let Some(token) = self.single_token(term) else {
                    return Ok(None);
                };
                let term = self.text_term(&field.name, &token);
                Ok(Some(Box::new(FuzzyTermQuery::new(term, *distance, true))))
            }
            QueryExpr::Regex(pattern) => {
                self.require_text(field, "regex")?;
                self.compile_regex(pattern, self.index_schema.text)
            }
            QueryExpr::All => Err(QueryError::compile(format!(
                "field-scoped '*' is not supported (field {})",
                field.name
            ))),
            QueryExpr::Not(inner) => match self.compile_scoped(field, inner)? {
                Some(q) => {
                    let clauses = vec![
                        (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                        (Occur::MustNot, q),
                    ];
                    Ok(Some(Box::new(BooleanQuery::new(clauses))))
                }
                None => Ok(None),
            },
            QueryExpr::And(exprs) => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for e in exprs {
                    if let Some(q) = self.compile_scoped(field, e)? {
                        clauses.push((Occur::Must, q));
                    }
                }
                if clauses.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Box::new(BooleanQuery::new(clauses))))
                }
            }
            QueryExpr::Or(exprs) => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for e in exprs {
                    if let Some(q) = self.compile_scoped(field, e)? {
                        clauses.push((Occur::Should, q));
                    }
                }
                if clauses.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Box::new(BooleanQuery::new(clauses))))
                }
            }
            QueryExpr::Boost { expr, factor } => {
                match self.compile_scoped(field, expr)? {
                    Some(q) => Ok(Some(Box::new(BoostQuery::new(q, *factor)))),
                    None => Ok(None),
                }
            }
            QueryExpr::Field { .. } => Err(QueryError::compile(
                "nested field qualifiers are not supported",
            )),
        }
    }

    /// Compiles a query against the dedicated `_id` column.
    fn compile_id_query(&mut self, expr: &QueryExpr) -> Result<MaybeQuery, QueryError> {
        match expr {
            QueryExpr::Term(text) => {
                let term = Term::from_field_text(self.index_schema.id, &text.to_lowercase());
                Ok(Some(Box::new(TermQuery::new(term, IndexRecordOption::Basic))))
            }
            QueryExpr::Range { lower, upper } => {
                let bound = |b: &RangeBound| -> Result<Bound<Term>, QueryError> {
                    match &b.value {
                        None => Ok(Bound::Unbounded),
                        Some(v) if v == self.null_token => Err(QueryError::compile(
                            "the null token cannot appear in a range",
                        )),
                        Some(v) => {
                            let term =
                                Term::from_field_text(self.index_schema.id, &v.to_lowercase());
                            Ok(if b.inclusive {
                                Bound::Included(term)
                            } else {
                                Bound::Excluded(term)
                            })
                        }
                    }
                };
                Ok(Some(Box::new(RangeQuery::new(bound(lower)?, bound(upper)?))))
            }
            _ => Err(QueryError::compile("_id supports term and range queries only")),
        }
    }

    /// Coerces a term literal to the field's data type and compiles it.
    fn compile_typed_term(
        &mut self,
        field: &SchemaField,
        text: &str,
    ) -> Result<MaybeQuery, QueryError> {
        match effective_type(field) {
            DataType::Text => {
                let words = [text.to_string()];
                Ok(self.compile_text_match(&field.name, &words))
            }
            DataType::Number => {
                let value = parse_number(&field.name, text)?;
                Ok(Some(self.kw_term_query(term_f64(self, &field.name, value))))
            }
            DataType::Boolean => {
                let value = parse_bool(&field.name, text)?;
                Ok(Some(self.kw_term_query(term_u64(self, &field.name, value))))
            }
            DataType::DateTime => {
                let ticks = parse_ticks(&field.name, text)?;
                Ok(Some(self.kw_term_query(term_u64(self, &field.name, ticks))))
            }
            DataType::Guid | DataType::Null => {
                let term = term_str(self, &field.name, &text.to_lowercase());
                Ok(Some(self.kw_term_query(term)))
            }
            DataType::Object => Err(QueryError::compile(format!(
                "field {} is an object and cannot be matched directly",
                field.name
            ))),
            DataType::Array => unreachable!("effective_type unwraps arrays"),
        }
    }

    /// Compiles a phrase within a field, which must be text.
    fn compile_typed_phrase(
        &mut self,
        field: &SchemaField,
        words: &[String],
    ) -> Result<MaybeQuery, QueryError> {
        if effective_type(field) != DataType::Text {
            return Err(QueryError::compile(format!(
                "phrase queries require a text field, but {} is {:?}",
                field.name, field.data_type
            )));
        }
        Ok(self.compile_text_match(&field.name, words))
    }

    /// Analyzes words and builds a term or phrase query on a text path.
    fn compile_text_match(&mut self, name: &str, words: &[String]) -> MaybeQuery {
        let tokens: Vec<String> = words
            .iter()
            .flat_map(|w| tokenize(&mut self.analyzer, w))
            .collect();
        match tokens.len() {
            0 => None,
            1 => {
                let term = self.text_term(name, &tokens[0]);
                Some(Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)))
            }
            _ => {
                let terms: Vec<Term> = tokens.iter().map(|t| self.text_term(name, t)).collect();
                Some(Box::new(PhraseQuery::new(terms)))
            }
        }
    }

    /// Coerces range bounds to the field's data type and compiles them.
    fn compile_typed_range(
        &mut self,
        field: &SchemaField,
        lower: &RangeBound,
        upper: &RangeBound,
    ) -> Result<MaybeQuery, QueryError> {
        for bound in [lower, upper] {
            if bound.value.as_deref() == Some(self.null_token) {
                return Err(QueryError::compile(
                    "the null token cannot appear in a range",
                ));
            }
        }

        let name = &field.name;
        let query: Box<dyn Query> = match effective_type(field) {
            DataType::Number => {
                let make = |b: &RangeBound| -> Result<Bound<Term>, QueryError> {
                    bound_term(b, |v| Ok(term_f64(self, name, parse_number(name, v)?)))
                };
                Box::new(RangeQuery::new(make(lower)?, make(upper)?))
            }
            DataType::DateTime => {
                let make = |b: &RangeBound| -> Result<Bound<Term>, QueryError> {
                    bound_term(b, |v| Ok(term_u64(self, name, parse_ticks(name, v)?)))
                };
                Box::new(RangeQuery::new(make(lower)?, make(upper)?))
            }
            DataType::Boolean => {
                let make = |b: &RangeBound| -> Result<Bound<Term>, QueryError> {
                    bound_term(b, |v| Ok(term_u64(self, name, parse_bool(name, v)?)))
                };
                Box::new(RangeQuery::new(make(lower)?, make(upper)?))
            }
            DataType::Guid => {
                let make = |b: &RangeBound| -> Result<Bound<Term>, QueryError> {
                    bound_term(b, |v| Ok(term_str(self, name, &v.to_lowercase())))
                };
                Box::new(RangeQuery::new(make(lower)?, make(upper)?))
            }
            other => {
                return Err(QueryError::compile(format!(
                    "range queries are not supported on {other:?} field {name}"
                )));
            }
        };
        Ok(Some(query))
    }

    /// Builds the exact-match query against a field's null-marker column.
    fn null_marker_query(&self, name: &str) -> Box<dyn Query> {
        let mut term =
            Term::from_field_json_path(self.index_schema.keyword, &null_path(name), true);
        term.append_type_and_fast_value(1_u64);
        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
    }

    /// Compiles a regex pattern against a tantivy field.
    fn compile_regex(
        &self,
        pattern: &str,
        field: tantivy::schema::Field,
    ) -> Result<MaybeQuery, QueryError> {
        RegexQuery::from_pattern(pattern, field)
            .map(|q| Some(Box::new(q) as Box<dyn Query>))
            .map_err(|e| QueryError::compile(format!("invalid regex {pattern:?}: {e}")))
    }

    /// Errors unless the field is text (or an array of text).
    fn require_text(&self, field: &SchemaField, operator: &str) -> Result<(), QueryError> {
        if effective_type(field) == DataType::Text {
            Ok(())
        } else {
            Err(QueryError::compile(format!(
                "{operator} queries require a text field, but {} is {:?}",
                field.name, field.data_type
            )))
        }
    }

    /// Analyzes a literal expecting a single token.
    fn single_token(&mut self, text: &str) -> Option<String> {
        let mut tokens = tokenize(&mut self.analyzer, text);
        if tokens.len() == 1 {
            tokens.pop()
        } else {
            None
        }
    }

    /// Builds a term on the tokenized column family.
    fn text_term(&self, path: &str, token: &str) -> Term {
        let mut term = Term::from_field_json_path(self.index_schema.text, path, true);
        term.append_type_and_str(token);
        term
    }

    /// Wraps a raw-family term in an exact-match query.
    fn kw_term_query(&self, term: Term) -> Box<dyn Query> {
        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
    }

    /// Compiles an unqualified term against the full-text field.
    fn compile_full_text_term(&mut self, text: &str) -> MaybeQuery {
        let tokens = tokenize(&mut self.analyzer, text);
        self.full_text_tokens_query(&tokens)
    }

    /// Compiles an unqualified phrase against the full-text field.
    fn compile_full_text_phrase(&mut self, words: &[String]) -> MaybeQuery {
        let tokens: Vec<String> = words
            .iter()
            .flat_map(|w| tokenize(&mut self.analyzer, w))
            .collect();
        self.full_text_tokens_query(&tokens)
    }

    /// Builds a term or phrase query on the full-text field.
    fn full_text_tokens_query(&self, tokens: &[String]) -> MaybeQuery {
        let field = self.index_schema.full_text;
        match tokens.len() {
            0 => None,
            1 => {
                let term = Term::from_field_text(field, &tokens[0]);
                Some(Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)))
            }
            _ => {
                let terms: Vec<Term> = tokens
                    .iter()
                    .map(|t| Term::from_field_text(field, t))
                    .collect();
                Some(Box::new(PhraseQuery::new(terms)))
            }
        }
    }

    /// Compiles an unqualified prefix against the full-text field.
    fn compile_full_text_prefix(&mut self, stem: &str) -> Result<MaybeQuery, QueryError> {
        let Some(token) = self.single_token(stem) else {
            return Ok(None);
        };
        let term = Term::from_field_text(self.index_schema.full_text, &token);
        Ok(Some(Box::new(FuzzyTermQuery::new_prefix(term, 0, true))))
    }

    /// Compiles an unqualified fuzzy term against the full-text field.
    fn compile_full_text_fuzzy(
        &mut self,
        text: &str,
        distance: u8,
    ) -> Result<MaybeQuery, QueryError> {
        let Some(token) = self.single_token(text) else {
            return Ok(None);
        };
        let term = Term::from_field_text(self.index_schema.full_text, &token);
        Ok(Some(Box::new(FuzzyTermQuery::new(term, distance, true))))
    }
}

/// The data type a field's values actually carry (array element type for
/// arrays).
fn effective_type(field: &SchemaField) -> DataType {
    match field.data_type {
        DataType::Array => field.array_element_data_type,
        other => other,
    }
}

/// Lifts a typed term constructor over an optional range bound.
fn bound_term(
    bound: &RangeBound,
    mut make: impl FnMut(&str) -> Result<Term, QueryError>,
) -> Result<Bound<Term>, QueryError> {
    match &bound.value {
        None => Ok(Bound::Unbounded),
        Some(v) => {
            let term = make(v)?;
            Ok(if bound.inclusive {
                Bound::Included(term)
            } else {
                Bound::Excluded(term)
            })
        }
    }
}

/// Parses a number literal, naming the offending substring on failure.
fn parse_number(field: &str, text: &str) -> Result<f64, QueryError> {
    text.parse::<f64>()
        .map_err(|_| QueryError::compile(format!("invalid number {text:?} for field {field}")))
}

/// Parses a boolean literal into its 0/1 encoding.
fn parse_bool(field: &str, text: &str) -> Result<u64, QueryError> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(1),
        "false" | "0" => Ok(0),
        _ => Err(QueryError::compile(format!(
            "invalid boolean {text:?} for field {field}"
        ))),
    }
}

/// Parses a timestamp literal into its tick encoding.
fn parse_ticks(field: &str, text: &str) -> Result<u64, QueryError> {
    parse_datetime(text)
        .map(|dt| datetime_to_ticks(&dt) as u64)
        .ok_or_else(|| QueryError::compile(format!("invalid timestamp {text:?} for field {field}")))
}

/// Builds an f64 term on the raw column family.
fn term_f64(compiler: &QueryCompiler<'_>, path: &str, value: f64) -> Term {
    let mut term = Term::from_field_json_path(compiler.index_schema.keyword, path, true);
    term.append_type_and_fast_value(value);
    term
}

/// Builds a u64 term on the raw column family.
fn term_u64(compiler: &QueryCompiler<'_>, path: &str, value: u64) -> Term {
    let mut term = Term::from_field_json_path(compiler.index_schema.keyword, path, true);
    term.append_type_and_fast_value(value);
    term
}

/// Builds a string term on the raw column family.
fn term_str(compiler: &QueryCompiler<'_>, path: &str, value: &str) -> Term {
    let mut term = Term::from_field_json_path(compiler.index_schema.keyword, path, true);
    term.append_type_and_str(value);
    term
}
