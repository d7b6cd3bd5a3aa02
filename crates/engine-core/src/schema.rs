//! Schema-driven type coercion and the post-coercion transform pipeline
//! for every [`Record`] field.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The declared semantic type of a field. `Uuid`/`Name`/`Email` are
/// adapter-specific aliases used by the synthetic (`random`) source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    String,
    Int,
    Float,
    Bool,
    Time,
    Date,
    Decimal,
    Json,
    Number,
    Record,
    Array,
    Any,
    Uuid,
    Name,
    Email,
    /// Epoch seconds, emitted and stored as a plain integer — unlike `Time`,
    /// never becomes a `Value::Timestamp`.
    Unixtime,
}

/// `time{as: unix|unixmilli|iso8601}` reinterprets a numeric or string value
/// as an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeAs {
    Unix,
    Unixmilli,
    Iso8601,
}

/// A unary, post-coercion mapping from a field value to another value with a
/// new declared type. A null input always short-circuits to null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Serialize to string; timestamps/dates use `format` if given.
    String {
        #[serde(default)]
        format: Option<String>,
    },
    /// Reinterpret a numeric/string value as an instant.
    Time {
        #[serde(rename = "as")]
        as_: TimeAs,
    },
    Int,
    Float,
    Bool,
}

/// A single field's declaration inside a [`Schema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub data_type: SemanticType,
    #[serde(default)]
    pub rename: Option<String>,
    #[serde(default)]
    pub fields: Option<Schema>,
    #[serde(default)]
    pub items: Option<Box<FieldSpec>>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

impl FieldSpec {
    pub fn new(data_type: SemanticType) -> Self {
        Self {
            data_type,
            rename: None,
            fields: None,
            items: None,
            format: None,
            min: None,
            max: None,
            transforms: Vec::new(),
        }
    }

    /// The output key for this field: the rename target if declared,
    /// otherwise the declared key itself. Renaming is applied after
    /// transforms, so callers pass the declared key and get the
    /// downstream-visible key back.
    pub fn output_key<'a>(&'a self, declared_key: &'a str) -> &'a str {
        self.rename.as_deref().unwrap_or(declared_key)
    }
}

/// A mapping from field name to [`FieldSpec`], declared once per adapter and
/// immutable during a run. Iteration order is declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: IndexMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: FieldSpec) {
        self.fields.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Raw, adapter-native representation of a value prior to coercion. Source
/// adapters build one of these from whatever their wire format hands back
/// (a CSV cell, a driver-typed column, a generated value) and hand it to
/// [`coerce`].
#[derive(Debug, Clone)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Already-typed value — used by adapters (e.g. the synthetic source)
    /// that build canonical values directly and just need the transform
    /// pipeline applied.
    Value(Value),
}

/// A per-field coercion or transform failure. Carries enough context for the
/// engine to report it without the adapter needing to format its own
/// message naming the column, the declared type, and the observed
/// representation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("field {field}: declared {declared_type:?}, observed {observed}")]
pub struct FieldError {
    pub field: String,
    pub declared_type: SemanticType,
    pub observed: String,
}

/// Coerces a raw value to the canonical [`Value`] for `spec`'s declared
/// type.
pub fn coerce(field: &str, raw: RawValue, spec: &FieldSpec) -> Result<Value, FieldError> {
    let err = |observed: String| FieldError {
        field: field.to_string(),
        declared_type: spec.data_type,
        observed,
    };

    if matches!(raw, RawValue::Null) {
        return Ok(Value::Null);
    }

    match spec.data_type {
        SemanticType::String | SemanticType::Name | SemanticType::Email => match raw {
            RawValue::Str(s) => Ok(Value::String(s)),
            RawValue::Bytes(b) => String::from_utf8(b)
                .map(Value::String)
                .map_err(|e| err(format!("non-utf8 bytes: {e}"))),
            RawValue::Value(Value::String(s)) => Ok(Value::String(s)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Uuid => match raw {
            RawValue::Str(s) => Ok(Value::String(s)),
            RawValue::Value(Value::String(s)) => Ok(Value::String(s)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Int => match raw {
            RawValue::Int(i) => Ok(Value::Int(i)),
            RawValue::Value(Value::Int(i)) => Ok(Value::Int(i)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Float => match raw {
            RawValue::Float(f) => Ok(Value::Float(f)),
            RawValue::Int(i) => Ok(Value::Float(i as f64)),
            RawValue::Value(Value::Float(f)) => Ok(Value::Float(f)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Bool => match raw {
            RawValue::Bool(b) => Ok(Value::Bool(b)),
            RawValue::Int(i) => Ok(Value::Bool(i != 0)),
            RawValue::Value(Value::Bool(b)) => Ok(Value::Bool(b)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Time => match raw {
            RawValue::Value(Value::Timestamp(t)) => Ok(Value::Timestamp(t)),
            RawValue::Str(s) => {
                let layout = spec.format.as_deref().unwrap_or("%Y-%m-%d %H:%M:%S");
                chrono::NaiveDateTime::parse_from_str(&s, layout)
                    .map(|naive| Value::Timestamp(Utc.from_utc_datetime(&naive)))
                    .map_err(|e| err(format!("{s:?} ({e})")))
            }
            RawValue::Int(epoch) => Utc
                .timestamp_opt(epoch, 0)
                .single()
                .map(Value::Timestamp)
                .ok_or_else(|| err(format!("{epoch}"))),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Unixtime => match raw {
            RawValue::Int(i) => Ok(Value::Int(i)),
            RawValue::Value(Value::Int(i)) => Ok(Value::Int(i)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Date => match raw {
            RawValue::Value(Value::Date(d)) => Ok(Value::Date(d)),
            RawValue::Str(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| err(format!("{s:?} ({e})"))),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Decimal => match raw {
            RawValue::Str(s) => match rust_decimal::Decimal::from_str(&s) {
                Ok(_) => Ok(Value::Decimal(s)),
                Err(e) => Err(err(format!("{s:?} ({e})"))),
            },
            RawValue::Value(Value::Decimal(s)) => Ok(Value::Decimal(s)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Json => match raw {
            RawValue::Str(s) => serde_json::from_str::<serde_json::Value>(&s)
                .map(Value::Json)
                .map_err(|e| err(format!("{s:?} ({e})"))),
            RawValue::Value(v @ Value::Record(_)) => Ok(v),
            RawValue::Value(Value::Json(v)) => Ok(Value::Json(v)),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Number => match raw {
            RawValue::Str(s) => Ok(Value::Decimal(s)),
            RawValue::Int(i) => Ok(Value::Int(i)),
            RawValue::Float(f) => Ok(Value::Float(f)),
            RawValue::Value(v) => Ok(v),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Record => match raw {
            RawValue::Value(v @ Value::Record(_)) => Ok(v),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Array => match raw {
            RawValue::Value(v @ Value::Array(_)) => Ok(v),
            other => Err(err(format!("{other:?}"))),
        },
        SemanticType::Any => match raw {
            RawValue::Null => Ok(Value::Null),
            RawValue::Bool(b) => Ok(Value::Bool(b)),
            RawValue::Int(i) => Ok(Value::Int(i)),
            RawValue::Float(f) => Ok(Value::Float(f)),
            RawValue::Str(s) => Ok(Value::String(s)),
            RawValue::Bytes(b) => Ok(Value::Bytes(b)),
            RawValue::Value(v) => Ok(v),
        },
    }
}

/// Applies `spec`'s declared transform pipeline, in order, to an
/// already-coerced value. A null input short-circuits to null without
/// error; a transform failure is reported as a [`FieldError`] (the caller
/// decides whether that's fatal or just nulls the field).
pub fn apply_transforms(field: &str, mut value: Value, spec: &FieldSpec) -> Result<Value, FieldError> {
    for t in &spec.transforms {
        if value.is_null() {
            continue;
        }
        value = apply_transform(field, value, t, spec)?;
    }
    Ok(value)
}

fn apply_transform(
    field: &str,
    value: Value,
    transform: &Transform,
    spec: &FieldSpec,
) -> Result<Value, FieldError> {
    let err = |observed: String| FieldError {
        field: field.to_string(),
        declared_type: spec.data_type,
        observed,
    };
    match transform {
        Transform::String { format } => Ok(Value::String(match &value {
            Value::Timestamp(t) => match format {
                Some(f) => format_chrono(*t, f),
                None => t.to_rfc3339(),
            },
            Value::Date(d) => match format {
                Some(f) => d.format(f).to_string(),
                None => d.format("%Y-%m-%d").to_string(),
            },
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(s) => s.clone(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            other => other.to_json().to_string(),
        })),
        Transform::Time { as_ } => match as_ {
            TimeAs::Unix => match value {
                Value::Int(secs) => Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .map(Value::Timestamp)
                    .ok_or_else(|| err(format!("{secs}"))),
                other => Err(err(format!("{other:?}"))),
            },
            TimeAs::Unixmilli => match value {
                Value::Int(ms) => Utc
                    .timestamp_millis_opt(ms)
                    .single()
                    .map(Value::Timestamp)
                    .ok_or_else(|| err(format!("{ms}"))),
                other => Err(err(format!("{other:?}"))),
            },
            TimeAs::Iso8601 => match value {
                Value::String(s) => DateTime::parse_from_rfc3339(&s)
                    .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                    .map_err(|e| err(format!("{s:?} ({e})"))),
                other => Err(err(format!("{other:?}"))),
            },
        },
        Transform::Int => match value {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| err(format!("{s:?} ({e})"))),
            other => Err(err(format!("{other:?}"))),
        },
        Transform::Float => match value {
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::String(s) => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| err(format!("{s:?} ({e})"))),
            other => Err(err(format!("{other:?}"))),
        },
        Transform::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Int(i) => Ok(Value::Bool(i != 0)),
            Value::String(s) => match s.as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                other => Err(err(format!("{other:?}"))),
            },
            other => Err(err(format!("{other:?}"))),
        },
    }
}

/// Translates a Go-style reference-time layout (the default `time` layout is
/// written this way, e.g. `2006-01-02 15:04:05`) into a chrono strftime
/// format, falling back to treating `layout` as already a strftime format if
/// it doesn't look like the Go reference time.
fn format_chrono(t: DateTime<Utc>, layout: &str) -> String {
    let translated = translate_go_layout(layout);
    t.format(&translated).to_string()
}

fn translate_go_layout(layout: &str) -> Arc<str> {
    let mut out = String::with_capacity(layout.len());
    let mut rest = layout;
    const PAIRS: &[(&str, &str)] = &[
        ("2006", "%Y"),
        ("01", "%m"),
        ("02", "%d"),
        ("15", "%H"),
        ("04", "%M"),
        ("05", "%S"),
    ];
    'outer: while !rest.is_empty() {
        for (pat, rep) in PAIRS {
            if rest.starts_with(pat) {
                out.push_str(rep);
                rest = &rest[pat.len()..];
                continue 'outer;
            }
        }
        let ch = rest.chars().next().unwrap();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    Arc::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_string_from_bytes() {
        let spec = FieldSpec::new(SemanticType::String);
        let v = coerce("name", RawValue::Bytes(b"hi".to_vec()), &spec).unwrap();
        assert_eq!(v, Value::String("hi".to_string()));
    }

    #[test]
    fn null_raw_is_always_null() {
        let spec = FieldSpec::new(SemanticType::Int);
        let v = coerce("age", RawValue::Null, &spec).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn null_short_circuits_transform_pipeline() {
        let mut spec = FieldSpec::new(SemanticType::Time);
        spec.transforms.push(Transform::String { format: None });
        let out = apply_transforms("created_at", Value::Null, &spec).unwrap();
        assert_eq!(out, Value::Null);
    }

    #[test]
    fn time_unix_transform_then_string_format_roundtrips() {
        let mut spec = FieldSpec::new(SemanticType::Int);
        spec.transforms.push(Transform::Time { as_: TimeAs::Unix });
        spec.transforms.push(Transform::String {
            format: Some("2006-01-02 15:04:05".to_string()),
        });
        let out = apply_transforms("ts", Value::Int(0), &spec).unwrap();
        assert_eq!(out, Value::String("1970-01-01 00:00:00".to_string()));
    }

    #[test]
    fn go_layout_translation() {
        assert_eq!(
            translate_go_layout("2006-01-02 15:04:05").as_ref(),
            "%Y-%m-%d %H:%M:%S"
        );
    }
}
