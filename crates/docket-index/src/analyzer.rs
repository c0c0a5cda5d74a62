//! Text analysis and per-field analyzer routing.
//!
//! Two analysis families exist:
//! - the full-text pipeline (`SimpleTokenizer`, optional `LowerCaser`, a
//!   long-token filter, optional English `Stemmer`) for tokenized text
//! - the `raw` keyword tokenizer for everything that must match exactly
//!   (guids, encoded numbers/booleans/timestamps, null markers)
//!
//! Which family a field uses is decided per value from the schema: `Text`
//! routes to the full-text family, every other scalar to the keyword
//! family, arrays route by their element type. A field that was `Null` and
//! later adopts a concrete type picks up the right family on the next
//! document automatically, because routing reads the live schema.

use docket_document::{DataType, SchemaField};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
};

/// Name of the full-text tokenizer registered with tantivy.
pub const FULL_TEXT_TOKENIZER: &str = "docket_text";

/// Maximum token length in bytes before filtering.
const MAX_TOKEN_LENGTH: usize = 40;

/// Which analysis family a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    /// Tokenized, lowercased, stemmed text.
    FullText,
    /// Single exact token.
    Keyword,
}

/// Builds the full-text analyzer.
///
/// Lowercasing and stemming are constructor-time options; the tokenizer and
/// the long-token filter are always on.
pub fn build_full_text_analyzer(lowercase: bool, stemming: bool) -> TextAnalyzer {
    let base = TextAnalyzer::builder(SimpleTokenizer::default());
    match (lowercase, stemming) {
        (true, true) => base
            .filter(LowerCaser)
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
            .filter(Stemmer::new(Language::English))
            .build(),
        (true, false) => base
            .filter(LowerCaser)
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
            .build(),
        (false, true) => base
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH))
            .filter(Stemmer::new(Language::English))
            .build(),
        (false, false) => base.filter(RemoveLongFilter::limit(MAX_TOKEN_LENGTH)).build(),
    }
}

/// Resolves the analysis family for a schema field.
///
/// Arrays are routed by their element type; an untyped (`Null`) field is a
/// keyword, matching the null-marker encoding it will receive.
pub fn route_field(field: &SchemaField) -> AnalyzerKind {
    let effective = match field.data_type {
        DataType::Array => field.array_element_data_type,
        other => other,
    };
    route_type(effective)
}

/// Resolves the analysis family for a bare data type.
pub fn route_type(data_type: DataType) -> AnalyzerKind {
    match data_type {
        DataType::Text => AnalyzerKind::FullText,
        DataType::Guid
        | DataType::Number
        | DataType::Boolean
        | DataType::DateTime
        | DataType::Null => AnalyzerKind::Keyword,
        // Objects route per child field; arrays were unwrapped above.
        // Anything unresolved falls back to full text.
        DataType::Array | DataType::Object => AnalyzerKind::FullText,
    }
}

/// Runs text through an analyzer and collects the produced tokens.
pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push(token.text.clone());
    }
    tokens
}
