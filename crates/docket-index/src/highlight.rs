//! Highlight pass over one page of results.
//!
//! Highlighting never touches the collection index: the full-text
//! projections of the current page's documents are rebuilt into a
//! throwaway in-memory index, the query is re-run there against only the
//! full-text content, and up to three 150-character fragments with `<b>`
//! markers come back per document. The whole index is discarded afterwards.
//!
//! Any failure in this pass degrades to "no highlight" at the call site;
//! it never fails a search.

use std::{collections::HashMap, ops::Range};

use docket_query::QueryExpr;
use tantivy::{
    Index, TantivyDocument, Term,
    query::{BooleanQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery},
    schema::{Field, IndexRecordOption, STORED, STRING, Schema as TantivySchema, TextFieldIndexing, TextOptions},
    snippet::SnippetGenerator,
    tokenizer::TextAnalyzer,
};

use crate::{IndexError, analyzer::FULL_TEXT_TOKENIZER, analyzer::tokenize};

/// Fragment length in bytes.
const FRAGMENT_LEN: usize = 150;

/// Maximum fragments per document.
const MAX_FRAGMENTS: usize = 3;

/// Leading context kept before a match inside a fragment.
const FRAGMENT_LEAD: usize = 40;

/// Opening highlight marker.
const MARK_START: &str = "<b>";

/// Closing highlight marker.
const MARK_END: &str = "</b>";

/// Runs the highlight pass for one page.
///
/// `docs` pairs each document id with its full-text projection. Returns a
/// fragment string per document that matched the query's text terms.
pub fn highlight_page(
    expr: &QueryExpr,
    analyzer: TextAnalyzer,
    docs: &[(String, String)],
) -> Result<HashMap<String, String>, IndexError> {
    if docs.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder = TantivySchema::builder();
    let id_field = builder.add_text_field("id", STRING | STORED);
    let body_indexing = TextFieldIndexing::default()
        .set_tokenizer(FULL_TEXT_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let body_field = builder.add_text_field(
        "body",
        TextOptions::default()
            .set_indexing_options(body_indexing)
            .set_stored(),
    );
    let schema = builder.build();

    let index = Index::create_in_ram(schema);
    index.tokenizers().register(FULL_TEXT_TOKENIZER, analyzer.clone());

    {
        let mut writer = index
            .writer_with_num_threads(1, 15_000_000)
            .map_err(|e| IndexError::write(&e))?;
        for (id, body) in docs {
            let mut doc = TantivyDocument::new();
            doc.add_text(id_field, id);
            doc.add_text(body_field, body);
            writer.add_document(doc).map_err(|e| IndexError::write(&e))?;
        }
        writer.commit().map_err(|e| IndexError::commit(&e))?;
    }

    let mut analyzer = analyzer;
    let Some(query) = build_highlight_query(expr, body_field, &mut analyzer) else {
        return Ok(HashMap::new());
    };

    let reader = index.reader().map_err(|e| IndexError::Write(e.to_string()))?;
    let searcher = reader.searcher();

    let mut generator = SnippetGenerator::create(&searcher, &*query, body_field)
        .map_err(|e| IndexError::Write(e.to_string()))?;
    // The generator works on whole bodies; fragmenting happens below.
    generator.set_max_num_chars(usize::MAX);

    let mut highlights = HashMap::new();
    for (id, body) in docs {
        let snippet = generator.snippet(body);
        let ranges = merge_ranges(snippet.highlighted().to_vec(), Vec::new());
        if ranges.is_empty() {
            continue;
        }
        highlights.insert(id.clone(), render_fragments(body, &ranges));
    }
    Ok(highlights)
}

/// Projects a query onto the highlight index: text terms, phrases, fuzzy,
/// prefix, and regex clauses survive (joined as alternatives); everything
/// schema-typed (ranges, null predicates, match-all) drops out.
fn build_highlight_query(
    expr: &QueryExpr,
    body: Field,
    analyzer: &mut TextAnalyzer,
) -> Option<Box<dyn Query>> {
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    collect_highlight_clauses(expr, body, analyzer, &mut clauses);
    if clauses.is_empty() {
        None
    } else {
        Some(Box::new(BooleanQuery::new(clauses)))
    }
}

/// Recursive worker for [`build_highlight_query`].
fn collect_highlight_clauses(
    expr: &QueryExpr,
    body: Field,
    analyzer: &mut TextAnalyzer,
    out: &mut Vec<(Occur, Box<dyn Query>)>,
) {
    match expr {
        QueryExpr::Term(text) => {
            for token in tokenize(analyzer, text) {
                let term = Term::from_field_text(body, &token);
                out.push((
                    Occur::Should,
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
                ));
            }
        }
        QueryExpr::Phrase(words) => {
            let tokens: Vec<String> = words.iter().flat_map(|w| tokenize(analyzer, w)).collect();
            match tokens.len() {
                0 => {}
                1 => {
                    let term = Term::from_field_text(body, &tokens[0]);
                    out.push((
                        Occur::Should,
                        Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
                    ));
                }
                _ => {
                    let terms = tokens
                        .iter()
                        .map(|t| Term::from_field_text(body, t))
                        .collect();
                    out.push((Occur::Should, Box::new(PhraseQuery::new(terms))));
                }
            }
        }
        QueryExpr::Prefix(stem) => {
            let tokens = tokenize(analyzer, stem);
            if let [token] = tokens.as_slice() {
                let term = Term::from_field_text(body, token);
                out.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new_prefix(term, 0, true)),
                ));
            }
        }
        QueryExpr::Fuzzy { term, distance } => {
            let tokens = tokenize(analyzer, term);
            if let [token] = tokens.as_slice() {
                let term = Term::from_field_text(body, token);
                out.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(term, *distance, true)),
                ));
            }
        }
        QueryExpr::Regex(pattern) => {
            if let Ok(query) = RegexQuery::from_pattern(pattern, body) {
                out.push((Occur::Should, Box::new(query)));
            }
        }
        QueryExpr::Field { expr, .. } | QueryExpr::Boost { expr, .. } => {
            collect_highlight_clauses(expr, body, analyzer, out);
        }
        QueryExpr::And(exprs) | QueryExpr::Or(exprs) => {
            for e in exprs {
                collect_highlight_clauses(e, body, analyzer, out);
            }
        }
        // Negations never highlight; typed constructs have no text to mark.
        QueryExpr::Not(_) | QueryExpr::Range { .. } | QueryExpr::All => {}
    }
}

/// Merges two sets of byte ranges, combining overlapping or adjacent
/// ranges. The result is sorted by start with no overlaps.
pub fn merge_ranges(mut a: Vec<Range<usize>>, b: Vec<Range<usize>>) -> Vec<Range<usize>> {
    a.extend(b);
    if a.is_empty() {
        return a;
    }

    a.sort_by_key(|r| r.start);

    let mut merged = Vec::with_capacity(a.len());
    let mut current = a[0].clone();

    for range in a.into_iter().skip(1) {
        if range.start <= current.end {
            current.end = current.end.max(range.end);
        } else {
            merged.push(current);
            current = range;
        }
    }
    merged.push(current);

    merged
}

/// Builds up to [`MAX_FRAGMENTS`] marked fragments around match ranges.
fn render_fragments(text: &str, ranges: &[Range<usize>]) -> String {
    let mut fragments = Vec::new();
    let mut next_range = 0;

    while next_range < ranges.len() && fragments.len() < MAX_FRAGMENTS {
        let anchor = &ranges[next_range];
        let start = floor_char_boundary(text, anchor.start.saturating_sub(FRAGMENT_LEAD));
        let mut end = ceil_char_boundary(text, (start + FRAGMENT_LEN).min(text.len()));

        // Pull in every range that starts inside the window; extend the
        // window when one runs past it.
        let mut included = Vec::new();
        while next_range < ranges.len() && ranges[next_range].start < end {
            let range = &ranges[next_range];
            end = ceil_char_boundary(text, end.max(range.end.min(text.len())));
            included.push(range.start.min(end)..range.end.min(end));
            next_range += 1;
        }

        fragments.push(mark_window(text, start, end, &included));
    }

    fragments.join(" … ")
}

/// Renders one window with its match ranges wrapped in markers.
fn mark_window(text: &str, start: usize, end: usize, ranges: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(end - start + ranges.len() * 8);
    let mut cursor = start;
    for range in ranges {
        if range.start > cursor {
            out.push_str(&text[cursor..range.start]);
        }
        out.push_str(MARK_START);
        out.push_str(&text[range.start..range.end]);
        out.push_str(MARK_END);
        cursor = range.end;
    }
    if cursor < end {
        out.push_str(&text[cursor..end]);
    }
    out
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary at or above `index`.
fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
