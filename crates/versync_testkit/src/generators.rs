//! Property-based test generators using proptest.
//!
//! Provides strategies for payload trees and identifiers.

use proptest::prelude::*;
use versync_protocol::{RecordType, Value};

/// Strategy for map keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for item ids.
pub fn item_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_-]{0,23}").expect("Invalid regex")
}

/// Strategy for record types.
pub fn record_type_strategy() -> impl Strategy<Value = RecordType> {
    prop::sample::select(RecordType::ALL.to_vec())
}

/// Strategy for leaf values. Floats are finite so equality is reflexive.
pub fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-z ]{0,12}".prop_map(Value::Text),
    ]
}

/// Strategy for arbitrary payload trees up to a small depth.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((key_strategy(), inner), 0..6)
                .prop_map(|pairs| Value::map(pairs)),
        ]
    })
}

/// Strategy for map-shaped payloads, the usual record shape.
pub fn map_value_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec((key_strategy(), value_strategy()), 0..8)
        .prop_map(|pairs| Value::map(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn map_values_are_maps(value in map_value_strategy()) {
            prop_assert!(value.as_map().is_some());
        }

        #[test]
        fn item_ids_are_non_empty(id in item_id_strategy()) {
            prop_assert!(!id.is_empty());
        }
    }
}
