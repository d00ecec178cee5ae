//! Answer values stored against a detail.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A JSON-shaped answer.
///
/// Serialises untagged, so it reads and writes as plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<DetailValue>),
    Map(BTreeMap<String, DetailValue>),
}

impl DetailValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DetailValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DetailValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Encode for storage in a detail row.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<&str> for DetailValue {
    fn from(s: &str) -> Self {
        DetailValue::String(s.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        DetailValue::String(s)
    }
}

impl From<bool> for DetailValue {
    fn from(b: bool) -> Self {
        DetailValue::Bool(b)
    }
}

impl From<i64> for DetailValue {
    fn from(n: i64) -> Self {
        DetailValue::Number(n.into())
    }
}

impl From<serde_json::Value> for DetailValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DetailValue::Null,
            serde_json::Value::Bool(b) => DetailValue::Bool(b),
            serde_json::Value::Number(n) => DetailValue::Number(n),
            serde_json::Value::String(s) => DetailValue::String(s),
            serde_json::Value::Array(items) => {
                DetailValue::List(items.into_iter().map(DetailValue::from).collect())
            }
            serde_json::Value::Object(map) => DetailValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, DetailValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<DetailValue> for serde_json::Value {
    fn from(value: DetailValue) -> Self {
        match value {
            DetailValue::Null => serde_json::Value::Null,
            DetailValue::Bool(b) => serde_json::Value::Bool(b),
            DetailValue::Number(n) => serde_json::Value::Number(n),
            DetailValue::String(s) => serde_json::Value::String(s),
            DetailValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            DetailValue::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_each_shape() {
        let raw = json!({
            "nothing": null,
            "flag": true,
            "count": 3,
            "ratio": 0.5,
            "name": "Ada",
            "list": [1, "two", null],
        });
        let value: DetailValue = serde_json::from_value(raw).unwrap();
        let DetailValue::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(map["nothing"], DetailValue::Null);
        assert_eq!(map["flag"], DetailValue::Bool(true));
        assert_eq!(map["count"], DetailValue::from(3i64));
        assert!(matches!(map["ratio"], DetailValue::Number(_)));
        assert_eq!(map["name"].as_str(), Some("Ada"));
        assert!(matches!(&map["list"], DetailValue::List(items) if items.len() == 3));
    }

    #[test]
    fn test_stored_json_is_plain() {
        let value = DetailValue::from("2000-01-01");
        assert_eq!(value.to_json().unwrap(), "\"2000-01-01\"");
        assert_eq!(DetailValue::Null.to_json().unwrap(), "null");
    }

    #[test]
    fn test_nested_value_survives_storage() {
        let value: DetailValue = json!({"b": [1, {"c": false}], "a": 1.25e3}).into();
        let decoded = DetailValue::from_json(&value.to_json().unwrap()).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(serde_json::Value::from(decoded), json!({"a": 1250.0, "b": [1, {"c": false}]}));
    }
}
