//! Facet label construction and facet filter parsing.
//!
//! A facet-enabled schema field turns document values into hierarchical
//! labels on the index's facet field. The first path segment is the facet
//! name; the remaining segments come from the formatted value, split on the
//! facet's hierarchy separator when it is hierarchical. `\<sep>` escapes a
//! literal separator inside a segment.

use docket_document::{Document, FacetSettings, SchemaField, Value};
use tantivy::schema::Facet;
use tracing::warn;

/// Longest text value that may become a facet label.
const MAX_TEXT_FACET_CHARS: usize = 100;

/// Render pattern applied to datetime facets when none is configured.
const DEFAULT_DATE_FORMAT: &str = "yyyy/MMM/dd";

/// Builds the facet labels a document contributes to one facet field.
///
/// Returns one label per (array element) value; values that cannot be
/// faceted are skipped with a warning and never fail the write.
pub fn build_labels(doc: &Document, field: &SchemaField) -> Vec<Facet> {
    let Some(settings) = field.facet_settings.as_ref() else {
        return Vec::new();
    };
    let Some(value) = doc.get_path(&field.name) else {
        return Vec::new();
    };

    let mut labels = Vec::new();
    collect_labels(value, field, settings, &mut labels);
    labels
}

/// Recursive worker for [`build_labels`]: arrays emit one label per element.
fn collect_labels(value: &Value, field: &SchemaField, settings: &FacetSettings, out: &mut Vec<Facet>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_labels(item, field, settings, out);
            }
        }
        other => {
            if let Some(formatted) = format_value(other, field, settings) {
                let segments = if settings.is_hierarchical {
                    split_hierarchy(&formatted, &settings.hierarchy_separator)
                } else {
                    vec![formatted]
                };
                if !segments.is_empty() {
                    let path = std::iter::once(settings.facet_name.clone()).chain(segments);
                    out.push(Facet::from_path(path));
                }
            }
        }
    }
}

/// Formats one scalar value for faceting, or None when it must be skipped.
fn format_value(value: &Value, field: &SchemaField, settings: &FacetSettings) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(s) => {
            if s.chars().count() > MAX_TEXT_FACET_CHARS {
                warn!(field = %field.name, "text value too long to facet, skipping");
                return None;
            }
            Some(s.clone())
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::DateTime(dt) => {
            let pattern = settings.format_string.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
            Some(format_date(dt, pattern))
        }
        Value::Number(n) => Some(format!("{n}")),
        Value::Guid(guid) => Some(guid.as_hyphenated().to_string()),
        Value::Object(_) | Value::Array(_) => {
            warn!(field = %field.name, data_type = ?value.data_type(), "cannot facet structured value");
            None
        }
    }
}

/// Renders a timestamp through a date pattern.
///
/// Recognized tokens: `yyyy`, `MMM`, `MM`, `dd`, `HH`, `mm`, `ss`. Any
/// other character passes through literally, so `yyyy/MMM/dd` renders as
/// `1979/Oct/12`.
pub fn format_date(dt: &chrono::DateTime<chrono::Utc>, pattern: &str) -> String {
    let mut chrono_pattern = String::with_capacity(pattern.len());
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let rest = &pattern[i..];
        let (token, len) = if rest.starts_with("yyyy") {
            ("%Y", 4)
        } else if rest.starts_with("MMM") {
            ("%b", 3)
        } else if rest.starts_with("MM") {
            ("%m", 2)
        } else if rest.starts_with("dd") {
            ("%d", 2)
        } else if rest.starts_with("HH") {
            ("%H", 2)
        } else if rest.starts_with("mm") {
            ("%M", 2)
        } else if rest.starts_with("ss") {
            ("%S", 2)
        } else {
            // Escape '%' so user patterns cannot inject chrono specifiers.
            if rest.starts_with('%') {
                chrono_pattern.push_str("%%");
            } else {
                chrono_pattern.push(rest.chars().next().unwrap());
            }
            i += rest.chars().next().unwrap().len_utf8();
            continue;
        };
        chrono_pattern.push_str(token);
        i += len;
    }
    dt.format(&chrono_pattern).to_string()
}

/// Splits a formatted value into hierarchy segments on `separator`,
/// honoring `\<separator>` escapes. Empty segments are dropped.
pub fn split_hierarchy(value: &str, separator: &str) -> Vec<String> {
    let sep_char = separator.chars().next().unwrap_or('/');
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some(&next) if next == sep_char => {
                    current.push(next);
                    chars.next();
                }
                Some(&next) => {
                    current.push('\\');
                    current.push(next);
                    chars.next();
                }
                None => current.push('\\'),
            }
        } else if ch == sep_char {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Splits one facet filter (`Name:path`) into the facet name and its raw
/// path, before the facet's settings are known.
pub fn split_filter(spec: &str) -> Option<(&str, &str)> {
    let (name, path) = spec.split_once(':')?;
    if name.is_empty() { None } else { Some((name, path)) }
}

/// Parses one facet filter into the facet name and its path segments.
///
/// The path splits on the facet's configured hierarchy separator with the
/// same escaping rules as label building, so a filter addresses exactly
/// the labels the builder produced.
pub fn parse_filter(spec: &str, separator: &str) -> Option<(String, Vec<String>)> {
    let (name, path) = split_filter(spec)?;
    Some((name.to_string(), split_hierarchy(path, separator)))
}

/// Builds the facet a drill-down filter selects.
pub fn filter_facet(name: &str, segments: &[String]) -> Facet {
    Facet::from_path(std::iter::once(name.to_string()).chain(segments.iter().cloned()))
}
