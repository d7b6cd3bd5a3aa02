//! The dynamically typed value variant backing every [`crate::record::Record`] field.
//!
//! Re-architected from a generic `any`/map-of-any representation into a closed,
//! tagged variant type: the variant itself drives serialization per-sink, and
//! value identity survives coercion (a `Value::Int` stays an `i64` until a
//! transform explicitly turns it into something else).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One field's value in a [`Record`].
///
/// Variants line up with the semantic types a [`crate::schema::FieldSpec`] can
/// declare: null, boolean, 64-bit signed integer, 64-bit
/// float, UTF-8 string, raw bytes, timestamp, calendar date, arbitrary
/// precision decimal (kept as its canonical string form — no float
/// conversion), opaque JSON, nested record, and list of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    /// Decimal text, preserved verbatim. Validated on construction with
    /// `rust_decimal::Decimal::from_str` but stored as the original string so
    /// trailing zeros and precision survive round-trips.
    Decimal(String),
    Json(serde_json::Value),
    Record(Record),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render this value the way a sink that needs a JSON representation
    /// would want it. Bytes become base64, decimals stay strings, dates and
    /// timestamps use their declared textual forms.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::String(s) => J::String(s.clone()),
            Value::Bytes(b) => J::String(BASE64.encode(b)),
            Value::Timestamp(t) => J::String(t.to_rfc3339()),
            Value::Date(d) => J::String(d.format("%Y-%m-%d").to_string()),
            Value::Decimal(s) => J::String(s.clone()),
            Value::Json(v) => v.clone(),
            Value::Record(r) => r.to_json(),
            Value::Array(items) => J::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Render this value as a single CSV field. Null becomes the empty
    /// string; composite values are serialized as JSON text.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => BASE64.encode(b),
            Value::Timestamp(t) => t.to_rfc3339(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Decimal(s) => s.clone(),
            Value::Json(v) => v.to_string(),
            Value::Record(r) => r.to_json().to_string(),
            Value::Array(_) => self.to_json().to_string(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(raw))
    }
}

impl Value {
    /// Adopt an arbitrary JSON value as a `Value`, used for `json`/`any`
    /// typed fields and for nested records sourced from JSON-ish adapters.
    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut record = Record::new();
                for (k, v) in map {
                    record.set(k, Value::from_json(v));
                }
                Value::Record(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_render_as_standard_base64() {
        assert_eq!(Value::Bytes(b"abc".to_vec()).to_json(), serde_json::Value::String("YWJj".to_string()));
        assert_eq!(Value::Bytes(b"ab".to_vec()).to_json(), serde_json::Value::String("YWI=".to_string()));
    }

    #[test]
    fn json_roundtrip_preserves_decimal_as_string() {
        let v = Value::Decimal("10.500".to_string());
        assert_eq!(v.to_json(), serde_json::Value::String("10.500".to_string()));
    }
}
