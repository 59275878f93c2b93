//! Property tests for the conflict engine.

use proptest::prelude::*;
use versync_protocol::{
    diff_fields, merge, reconcile, ItemStatus, Reconciliation, RecordType, RemoteSnapshot, SyncItem,
    Value,
};
use versync_testkit::generators::{
    item_id_strategy, map_value_strategy, record_type_strategy, value_strategy,
};

/// Collects the dotted paths of every non-map value. Empty maps have none.
fn leaf_paths(value: &Value, prefix: Option<String>, out: &mut Vec<String>) {
    match value {
        Value::Map(pairs) => {
            for (key, child) in pairs {
                let path = match &prefix {
                    Some(p) => format!("{p}.{key}"),
                    None => key.clone(),
                };
                leaf_paths(child, Some(path), out);
            }
        }
        _ => {
            if let Some(path) = prefix {
                out.push(path);
            }
        }
    }
}

proptest! {
    #[test]
    fn diff_of_identical_values_is_empty(value in value_strategy()) {
        prop_assert!(diff_fields(&value, &value).is_empty());
    }

    #[test]
    fn diff_is_symmetric(local in value_strategy(), remote in value_strategy()) {
        prop_assert_eq!(diff_fields(&local, &remote), diff_fields(&remote, &local));
    }

    #[test]
    fn diff_is_empty_only_for_equal_values(local in value_strategy(), remote in value_strategy()) {
        prop_assert_eq!(diff_fields(&local, &remote).is_empty(), local == remote);
    }

    #[test]
    fn merge_with_self_is_identity(value in value_strategy()) {
        prop_assert_eq!(merge(&value, &value), value);
    }

    #[test]
    fn merge_keeps_every_local_leaf(local in map_value_strategy(), remote in map_value_strategy()) {
        let merged = merge(&local, &remote);
        let mut paths = Vec::new();
        leaf_paths(&local, None, &mut paths);
        for path in paths {
            prop_assert_eq!(merged.pointer(&path), local.pointer(&path), "path {}", path);
        }
    }

    #[test]
    fn merge_keeps_remote_only_keys(local in map_value_strategy(), remote in map_value_strategy()) {
        let merged = merge(&local, &remote);
        for (key, value) in remote.as_map().unwrap_or_default() {
            if local.get(key).is_none() {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
    }

    #[test]
    fn each_track_bumps_version_by_one(
        record_type in record_type_strategy(),
        id in item_id_strategy(),
        payloads in prop::collection::vec(value_strategy(), 1..10),
    ) {
        let mut item = SyncItem::new(record_type, id, Value::Null);
        for (n, payload) in payloads.into_iter().enumerate() {
            item.record_mutation(payload);
            prop_assert_eq!(item.local_version, n as u64 + 2);
            prop_assert_eq!(item.status, ItemStatus::Pending);
        }
    }

    #[test]
    fn reconcile_never_pulls_over_local_changes(
        local_version in 1u64..20,
        base in 0u64..20,
        remote_version in 0u64..40,
        payload in value_strategy(),
    ) {
        let mut item = SyncItem::new(RecordType::Progress, "x", payload.clone());
        item.local_version = local_version.max(base);
        item.remote_version = (base > 0).then_some(base);
        let remote = RemoteSnapshot::new(payload, remote_version);

        match reconcile(&item, Some(&remote)) {
            Reconciliation::Push => prop_assert!(remote_version <= base),
            Reconciliation::Pull { version, .. } => {
                prop_assert!(remote_version > base);
                prop_assert!(!item.has_local_changes());
                prop_assert_eq!(version, remote_version);
            }
            Reconciliation::Conflict(conflict) => {
                prop_assert!(remote_version > base);
                prop_assert!(item.has_local_changes());
                prop_assert!(conflict.conflicting_fields.is_empty());
            }
        }
    }
}
