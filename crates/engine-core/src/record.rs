//! The ordered field map that backs every record flowing through the engine.
//!
//! Key order is insertion order and is preserved from extract through
//! serialization, so CSV columns and JSON object keys come out deterministic
//! Records exist only inside a [`Batch`]; once a loader
//! receives a batch it owns it exclusively — adapters must not alias a
//! `Record` across batches.

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::value::Value;

/// An ordered mapping from field name to [`Value`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(cap),
        }
    }

    /// Returns the value for `key` and whether it was present.
    pub fn get(&self, key: &str) -> (Option<&Value>, bool) {
        match self.fields.get(key) {
            Some(v) => (Some(v), true),
            None => (None, false),
        }
    }

    /// Inserts or overwrites `key`. Overwriting preserves the key's original
    /// insertion position rather than moving it to the end.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Emits a JSON object with keys in insertion order (`MarshalJSON`).
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Builds a record from a JSON object, preserving document order
    /// (`UnmarshalJSON`). Returns `None` if `v` is not an object.
    pub fn from_json_object(v: serde_json::Value) -> Option<Record> {
        match v {
            serde_json::Value::Object(map) => {
                let mut record = Record::with_capacity(map.len());
                for (k, v) in map {
                    record.set(k, Value::from_json(v));
                }
                Some(record)
            }
            _ => None,
        }
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> serde::Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Record::from_json_object(raw).ok_or_else(|| serde::de::Error::custom("expected an object"))
    }
}

/// A non-empty, ordered sequence of [`Record`]s — the unit of channel
/// transfer and of progress logging. The engine never sends empty batches.
pub type Batch = Vec<Record>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_preserves_first_insertion_position_on_overwrite() {
        let mut r = Record::new();
        r.set("a", Value::Int(1));
        r.set("b", Value::Int(2));
        r.set("a", Value::Int(3));
        let keys: Vec<&String> = r.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(r.get("a").0, Some(&Value::Int(3)));
    }

    #[test]
    fn to_json_preserves_order() {
        let mut r = Record::new();
        r.set("z", Value::Int(1));
        r.set("a", Value::Int(2));
        let j = r.to_json();
        let rendered = serde_json::to_string(&j).unwrap();
        assert_eq!(rendered, r#"{"z":1,"a":2}"#);
    }
}
