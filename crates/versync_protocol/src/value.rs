//! Dynamic payload value type.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A dynamic payload value.
///
/// Synchronized records carry their application data as a `Value` tree. The
/// engine never interprets the tree; it only compares and merges it. Map keys
/// are kept sorted and unique so that two structurally equal payloads always
/// compare equal and diffs come out in a stable order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// Null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs.
    ///
    /// Built through [`Value::map`], keys are sorted and unique. Entries
    /// assembled by hand are tolerated: lookups and diffs treat them as if
    /// built through [`Value::map`].
    Map(Vec<(String, Value)>),
}

fn is_sorted_unique(pairs: &[(String, Value)]) -> bool {
    pairs.windows(2).all(|w| w[0].0 < w[1].0)
}

/// Returns map entries sorted by key with the last duplicate winning.
/// Already sorted entries are borrowed.
pub(crate) fn sorted_entries(pairs: &[(String, Value)]) -> Cow<'_, [(String, Value)]> {
    if is_sorted_unique(pairs) {
        return Cow::Borrowed(pairs);
    }
    match Value::map(pairs.iter().cloned()) {
        Value::Map(entries) => Cow::Owned(entries),
        _ => Cow::Borrowed(pairs),
    }
}

impl Value {
    /// Creates a map value with sorted keys.
    ///
    /// When a key appears more than once the last occurrence wins.
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut entries: Vec<(String, Value)> = Vec::new();
        for (key, value) in pairs {
            let key = key.into();
            match entries.binary_search_by(|(k, _)| k.as_str().cmp(key.as_str())) {
                Ok(pos) => entries[pos].1 = value,
                Err(pos) => entries.insert(pos, (key, value)),
            }
        }
        Value::Map(entries)
    }

    /// Creates an empty map value.
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for values that have no children (everything except
    /// arrays and maps).
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Map(_))
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) if is_sorted_unique(pairs) => pairs
                .binary_search_by(|(k, _)| k.as_str().cmp(key))
                .ok()
                .map(|pos| &pairs[pos].1),
            Value::Map(pairs) => pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Looks up a dotted path such as `settings.audio.volume` or `items.0`.
    ///
    /// Array elements are addressed by decimal index. The root path `$`
    /// returns the value itself.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        if path == crate::conflict::ROOT_PATH {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| match current {
            Value::Map(_) => current.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Inserts or replaces a key in a map value.
    ///
    /// Returns the previous value for the key. Non-map values are left
    /// untouched and `None` is returned.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let Value::Map(pairs) = self else {
            return None;
        };
        if !is_sorted_unique(pairs) {
            *pairs = sorted_entries(pairs).into_owned();
        }
        let key = key.into();
        match pairs.binary_search_by(|(k, _)| k.as_str().cmp(key.as_str())) {
            Ok(pos) => Some(std::mem::replace(&mut pairs[pos].1, value)),
            Err(pos) => {
                pairs.insert(pos, (key, value));
                None
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::map(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(n) => serde_json::Value::from(n),
            // Non-finite floats have no JSON form and degrade to null.
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(pairs) => serde_json::Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", serde_json::Value::from(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_keys_are_sorted() {
        let map = Value::map([
            ("z", Value::Integer(1)),
            ("a", Value::Integer(2)),
            ("m", Value::Integer(3)),
        ]);

        let keys: Vec<&str> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let map = Value::map([("a", Value::Integer(1)), ("a", Value::Integer(2))]);
        assert_eq!(map.as_map().unwrap().len(), 1);
        assert_eq!(map.get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(42).as_bool(), None);

        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::Integer(42).as_float(), Some(42.0));
        assert_eq!(Value::Text("42".to_string()).as_integer(), None);

        assert_eq!(Value::Text("hello".to_string()).as_text(), Some("hello"));
        assert!(Value::Integer(1).is_leaf());
        assert!(!Value::empty_map().is_leaf());
    }

    #[test]
    fn pointer_walks_maps_and_arrays() {
        let value = Value::from(json!({
            "settings": { "audio": { "volume": 7 } },
            "items": [ { "name": "first" }, { "name": "second" } ]
        }));

        assert_eq!(
            value.pointer("settings.audio.volume"),
            Some(&Value::Integer(7))
        );
        assert_eq!(
            value.pointer("items.1.name"),
            Some(&Value::Text("second".into()))
        );
        assert_eq!(value.pointer("items.9"), None);
        assert_eq!(value.pointer("$"), Some(&value));
    }

    #[test]
    fn insert_keeps_order() {
        let mut map = Value::map([("b", Value::Integer(1))]);
        assert_eq!(map.insert("a", Value::Integer(0)), None);
        assert_eq!(map.insert("b", Value::Integer(5)), Some(Value::Integer(1)));

        let keys: Vec<&str> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);

        let mut scalar = Value::Integer(3);
        assert_eq!(scalar.insert("a", Value::Null), None);
        assert_eq!(scalar, Value::Integer(3));
    }

    #[test]
    fn json_conversion() {
        let source = json!({ "score": 10, "ratio": 0.5, "tags": ["a", "b"], "done": false });
        let value = Value::from(source.clone());

        assert_eq!(value.get("score"), Some(&Value::Integer(10)));
        assert_eq!(value.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(serde_json::Value::from(value), source);
    }

    #[test]
    fn serde_uses_natural_json() {
        let value = Value::map([("score", Value::Integer(10))]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"score":10}"#);

        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn non_finite_float_degrades_to_null() {
        let json = serde_json::Value::from(Value::Float(f64::INFINITY));
        assert!(json.is_null());
    }

    #[test]
    fn hand_built_maps_are_looked_up_by_key() {
        let mut value = Value::Map(vec![
            ("z".to_string(), Value::Integer(1)),
            ("a".to_string(), Value::Integer(2)),
            ("z".to_string(), Value::Integer(3)),
        ]);
        assert_eq!(value.get("a"), Some(&Value::Integer(2)));
        assert_eq!(value.get("z"), Some(&Value::Integer(3)));

        assert_eq!(value.insert("m", Value::Null), None);
        assert_eq!(
            value,
            Value::map([
                ("a", Value::Integer(2)),
                ("m", Value::Null),
                ("z", Value::Integer(3)),
            ])
        );
    }
}
