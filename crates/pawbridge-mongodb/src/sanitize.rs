//! Write-side sanitizing: turn client fields into a typed, schema-whitelisted document.

use crate::conversion::json_to_bson;
use crate::schema::{SchemaStore, ValueType};
use bson::{Bson, Document as BsonDocument};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::species::Props;

/// Stored in numeric fields whose input has no leading number
pub const UNPARSABLE_NUMBER: f64 = -1.0;

/// Leading decimal number, the way `parseFloat` reads it
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:Infinity|\d+\.?\d*(?:[eE][+-]?\d+)?|\.\d+(?:[eE][+-]?\d+)?)").unwrap()
});

/// Parse the leading number of a string, ignoring leading whitespace and any trailing text
pub fn parse_leading_number(raw: &str) -> Option<f64> {
    let found = LEADING_NUMBER.find(raw.trim_start())?.as_str();
    match found.trim_start_matches(['+', '-']) {
        "Infinity" if found.starts_with('-') => Some(f64::NEG_INFINITY),
        "Infinity" => Some(f64::INFINITY),
        _ => found.parse::<f64>().ok(),
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_number(s),
        _ => None,
    }
}

/// Parse a date from an RFC 3339 / ISO-like string or epoch milliseconds
pub fn parse_date(value: &Value) -> Option<bson::DateTime> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(bson::DateTime::from_millis),
        Value::String(s) => parse_date_str(s.trim()).map(bson::DateTime::from_chrono),
        _ => None,
    }
}

fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerce one client value to the storage form of its declared type.
///
/// Returns `None` when the value cannot be stored at all (an unparsable date).
pub fn coerce(val_type: &ValueType, value: &Value) -> Option<Bson> {
    match val_type {
        t if t.is_numeric() => Some(Bson::Double(
            parse_number(value).unwrap_or(UNPARSABLE_NUMBER),
        )),
        ValueType::Date => parse_date(value).map(Bson::DateTime),
        _ => Some(json_to_bson(value)),
    }
}

/// Builds update documents from untrusted write input
pub struct InputSanitizer<'a> {
    schemas: &'a SchemaStore,
}

impl<'a> InputSanitizer<'a> {
    pub fn new(schemas: &'a SchemaStore) -> Self {
        Self { schemas }
    }

    /// Keep the fields the species schema declares, coerced to their types, and stamp
    /// the species. `_id` never survives.
    pub fn sanitize(&self, species: &str, props: &Props) -> BsonDocument {
        let mut doc = BsonDocument::new();

        if let Some(schema) = self.schemas.schema(species) {
            for (name, prop) in props.iter() {
                let Some(field) = schema.get(name) else {
                    continue;
                };
                match coerce(&field.val_type, prop.value()) {
                    Some(value) => {
                        doc.insert(name, value);
                    }
                    None => {
                        tracing::warn!(species = %species, field = %name, value = %prop.value(), "Dropping unparsable value");
                    }
                }
            }
        }

        doc.insert("species", species);
        doc.remove("_id");
        doc
    }
}
