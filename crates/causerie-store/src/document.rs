//! Loosely-typed document values exchanged with the store.
//!
//! The adapter contract is key/value; schema discipline (which fields exist,
//! what they contain) is owned by this crate's [`crate::models`] and
//! [`crate::schema`] modules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Field map of a single document.
pub type Fields = BTreeMap<String, Value>;

/// Sentinel string the store replaces with its own clock at write time.
pub const SERVER_TIMESTAMP: &str = "__server_timestamp__";

/// Field value requesting a store-assigned timestamp.
pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP.to_string())
}

/// Encode a timestamp the way it is persisted (epoch milliseconds).
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::from(at.timestamp_millis())
}

/// Decode a persisted epoch-millisecond timestamp.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// A document read back from the store: its id plus its field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn string_field(&self, name: &str) -> Option<String> {
        self.str_field(name).map(str::to_string)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    pub fn time_field(&self, name: &str) -> Option<DateTime<Utc>> {
        self.i64_field(name).and_then(millis_to_datetime)
    }

    pub fn str_list_field(&self, name: &str) -> Option<Vec<String>> {
        let list = self.fields.get(name)?.as_array()?;
        list.iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn map_field(&self, name: &str) -> Option<&serde_json::Map<String, Value>> {
        self.fields.get(name).and_then(Value::as_object)
    }
}

/// Apply one field write, honoring dot paths (`"typingStatus.u1"` updates a
/// single entry of the nested map instead of replacing the whole map).
pub fn set_path(fields: &mut Fields, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(serde_json::Map::new());
            }
            let map = entry.as_object_mut().expect("object ensured above");
            set_path_in_map(map, rest, value);
        }
    }
}

fn set_path_in_map(map: &mut serde_json::Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(serde_json::Map::new());
            }
            let nested = entry.as_object_mut().expect("object ensured above");
            set_path_in_map(nested, rest, value);
        }
    }
}
