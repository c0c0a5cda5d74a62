//! Dynamic values.
//!
//! A [`Value`] is the unit of document content: a tagged enum over the
//! JSON-compatible data types, extended with `Guid` and `DateTime` variants
//! that are inferred from string content on intake. All dynamic access is by
//! matching; there is no reflection anywhere in the engine.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::schema::DataType;

/// Ticks per second (one tick = 100 ns).
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Tick count of the Unix epoch relative to 0001-01-01T00:00:00Z.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// The smallest encodable timestamp (0001-01-01T00:00:00Z).
pub const MIN_TICKS: i64 = 0;

/// The largest encodable timestamp (9999-12-31T23:59:59.9999999Z).
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

/// A dynamic document value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// A guid (canonical 36-character form on the wire).
    Guid(Uuid),
    /// Free text.
    Text(String),
    /// An IEEE-754 double. All JSON numbers collapse to this.
    Number(f64),
    /// A boolean.
    Bool(bool),
    /// A UTC timestamp with 100 ns precision.
    DateTime(DateTime<Utc>),
    /// An ordered list of values. Elements must share one data type.
    Array(Vec<Value>),
    /// A nested object.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the data type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Guid(_) => DataType::Guid,
            Self::Text(_) => DataType::Text,
            Self::Number(_) => DataType::Number,
            Self::Bool(_) => DataType::Boolean,
            Self::DateTime(_) => DataType::DateTime,
            Self::Array(_) => DataType::Array,
            Self::Object(_) => DataType::Object,
        }
    }

    /// Converts a serde_json value into a dynamic value.
    ///
    /// Strings are sniffed on the way in: canonical 36-character guids become
    /// [`Value::Guid`] and ISO-8601 timestamps (or plain dates) become
    /// [`Value::DateTime`]. Everything else maps structurally.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Self::from_string(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Classifies a string as guid, timestamp, or plain text.
    fn from_string(s: String) -> Self {
        if s.len() == 36 && s.as_bytes()[8] == b'-' {
            if let Ok(guid) = Uuid::parse_str(&s) {
                return Self::Guid(guid);
            }
        }
        if looks_like_datetime(&s) {
            if let Some(dt) = parse_datetime(&s) {
                return Self::DateTime(dt);
            }
        }
        Self::Text(s)
    }

    /// Converts this value back to serde_json form.
    ///
    /// Guids render in lowercased canonical form, timestamps in RFC 3339
    /// with full sub-second precision.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Guid(guid) => serde_json::Value::String(guid.as_hyphenated().to_string()),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Appends the plain-text projection of this value to `out`.
    ///
    /// Numbers render in decimal, timestamps as `YYYY-MM-DD`, booleans
    /// lowercased. Arrays and objects recurse. Used to synthesize the
    /// full-text field.
    pub fn append_projection(&self, out: &mut Vec<String>) {
        match self {
            Self::Null => {}
            Self::Guid(guid) => out.push(guid.as_hyphenated().to_string()),
            Self::Text(s) => out.push(s.clone()),
            Self::Number(n) => out.push(format!("{n}")),
            Self::Bool(b) => out.push(b.to_string()),
            Self::DateTime(dt) => out.push(dt.format("%Y-%m-%d").to_string()),
            Self::Array(items) => {
                for item in items {
                    item.append_projection(out);
                }
            }
            Self::Object(map) => {
                for value in map.values() {
                    value.append_projection(out);
                }
            }
        }
    }

    /// Returns the contained guid, if this is a guid value.
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Self::Guid(guid) => Some(*guid),
            _ => None,
        }
    }

    /// Returns the contained text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the contained number, if this is a number value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Cheap pre-check before attempting a full timestamp parse.
///
/// Timestamps start with a 4-digit year followed by `-`; anything else is
/// plain text and skips the parser entirely.
fn looks_like_datetime(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
}

/// Parses a timestamp permissively.
///
/// Accepts RFC 3339 (with offset or `Z`), a naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// (taken as UTC), the space-separated variant, and a bare `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

/// Encodes a timestamp as ticks: 100 ns intervals since 0001-01-01T00:00:00Z.
pub fn datetime_to_ticks(dt: &DateTime<Utc>) -> i64 {
    let ticks = dt.timestamp() * TICKS_PER_SECOND
        + i64::from(dt.timestamp_subsec_nanos() / 100)
        + UNIX_EPOCH_TICKS;
    ticks.clamp(MIN_TICKS, MAX_TICKS)
}

/// Decodes ticks back into a UTC timestamp.
pub fn datetime_from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let relative = ticks - UNIX_EPOCH_TICKS;
    let secs = relative.div_euclid(TICKS_PER_SECOND);
    let nanos = (relative.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn json_null_and_scalars() {
        assert_eq!(Value::from_json(serde_json::json!(null)), Value::Null);
        assert_eq!(Value::from_json(serde_json::json!(true)), Value::Bool(true));
        assert_eq!(
            Value::from_json(serde_json::json!(10)),
            Value::Number(10.0)
        );
        assert_eq!(
            Value::from_json(serde_json::json!("hello")),
            Value::Text("hello".to_string())
        );
    }

    #[test]
    fn guid_strings_are_sniffed() {
        let value = Value::from_json(serde_json::json!("6f1c43b2-9e5d-4a7e-8f13-0a2b3c4d5e6f"));
        assert_eq!(value.data_type(), DataType::Guid);
    }

    #[test]
    fn non_canonical_guid_stays_text() {
        // 32 hex chars without hyphens is not the canonical wire form.
        let value = Value::from_json(serde_json::json!("6f1c43b29e5d4a7e8f130a2b3c4d5e6f"));
        assert_eq!(value.data_type(), DataType::Text);
    }

    #[test]
    fn datetime_strings_are_sniffed() {
        let value = Value::from_json(serde_json::json!("1979-10-12T12:00:00Z"));
        let expected = Utc.with_ymd_and_hms(1979, 10, 12, 12, 0, 0).unwrap();
        assert_eq!(value, Value::DateTime(expected));
    }

    #[test]
    fn bare_date_is_midnight_utc() {
        let value = Value::from_json(serde_json::json!("2020-02-29"));
        let expected = Utc.with_ymd_and_hms(2020, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(value, Value::DateTime(expected));
    }

    #[test]
    fn slash_paths_stay_text() {
        let value = Value::from_json(serde_json::json!("Books/Fiction/Comedy"));
        assert_eq!(value.data_type(), DataType::Text);
    }

    #[test]
    fn numeric_looking_titles_stay_text() {
        let value = Value::from_json(serde_json::json!("1984"));
        assert_eq!(value.data_type(), DataType::Text);
    }

    #[test]
    fn nested_structure_maps_recursively() {
        let value = Value::from_json(serde_json::json!({
            "name": "x",
            "scores": [1, 2],
        }));
        let Value::Object(map) = value else {
            panic!("expected object");
        };
        assert_eq!(map["name"], Value::Text("x".to_string()));
        assert_eq!(
            map["scores"],
            Value::Array(vec![Value::Number(1.0), Value::Number(2.0)])
        );
    }

    #[test]
    fn ticks_round_trip() {
        let dt = Utc.with_ymd_and_hms(1979, 10, 12, 12, 0, 0).unwrap();
        let ticks = datetime_to_ticks(&dt);
        assert_eq!(datetime_from_ticks(ticks), Some(dt));
    }

    #[test]
    fn ticks_are_monotonic() {
        let earlier = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 1).unwrap();
        assert!(datetime_to_ticks(&earlier) < datetime_to_ticks(&later));
        assert!(datetime_to_ticks(&earlier) > 0);
    }

    #[test]
    fn epoch_ticks_constant() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(datetime_to_ticks(&epoch), 621_355_968_000_000_000);
    }

    #[test]
    fn projection_formats_types() {
        let mut out = Vec::new();
        Value::Number(10.0).append_projection(&mut out);
        Value::Bool(true).append_projection(&mut out);
        let dt = Utc.with_ymd_and_hms(1979, 10, 12, 12, 0, 0).unwrap();
        Value::DateTime(dt).append_projection(&mut out);
        Value::Null.append_projection(&mut out);
        assert_eq!(out, vec!["10", "true", "1979-10-12"]);
    }

    #[test]
    fn projection_recurses_into_arrays_and_objects() {
        let value = Value::from_json(serde_json::json!({
            "tags": ["a", "b"],
            "inner": {"deep": "c"},
        }));
        let mut out = Vec::new();
        value.append_projection(&mut out);
        assert_eq!(out, vec!["c", "a", "b"]);
    }

    #[test]
    fn json_round_trip_preserves_guid_form() {
        let raw = serde_json::json!("6f1c43b2-9e5d-4a7e-8f13-0a2b3c4d5e6f");
        let value = Value::from_json(raw.clone());
        assert_eq!(value.to_json(), raw);
    }
}
