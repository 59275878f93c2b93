//! Conflict detection and resolution.
//!
//! Detection compares version numbers only. Wall-clock timestamps never take
//! part in the decision, so clock skew between devices cannot flip it.

use crate::item::{RecordType, RemoteSnapshot, SyncItem};
use crate::value::{sorted_entries, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path reported when two payloads differ at the root and have no fields.
pub const ROOT_PATH: &str = "$";

/// Strategy for resolving a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Keep the local payload.
    TakeLocal,
    /// Accept the remote payload.
    TakeRemote,
    /// Field-wise merge, local wins on leaf collisions.
    Merge,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictStrategy::TakeLocal => "take_local",
            ConflictStrategy::TakeRemote => "take_remote",
            ConflictStrategy::Merge => "merge",
        })
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "take_local" | "local" => Ok(ConflictStrategy::TakeLocal),
            "take_remote" | "remote" => Ok(ConflictStrategy::TakeRemote),
            "merge" => Ok(ConflictStrategy::Merge),
            other => Err(format!("unknown conflict strategy: {other}")),
        }
    }
}

/// A conflict between the local and remote versions of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Id of the owning item.
    pub id: String,
    /// Record type of the owning item.
    pub record_type: RecordType,
    /// Local payload at detection time.
    pub local_payload: Value,
    /// Remote payload at detection time.
    pub remote_payload: Value,
    /// Local version at detection time.
    pub local_version: u64,
    /// Remote version at detection time.
    pub remote_version: u64,
    /// Dotted paths of the fields that differ, in stable order.
    pub conflicting_fields: Vec<String>,
    /// Chosen resolution, once one is applied.
    pub resolution: Option<ConflictStrategy>,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
}

impl SyncConflict {
    /// Builds a conflict from a local item and the diverged remote snapshot.
    pub fn detect(item: &SyncItem, remote: &RemoteSnapshot) -> Self {
        Self {
            id: item.id.clone(),
            record_type: item.record_type,
            local_payload: item.payload.clone(),
            remote_payload: remote.payload.clone(),
            local_version: item.local_version,
            remote_version: remote.version,
            conflicting_fields: diff_fields(&item.payload, &remote.payload),
            resolution: None,
            detected_at: Utc::now(),
        }
    }

    /// Returns true if the given dotted path is among the conflicting fields.
    pub fn touches(&self, path: &str) -> bool {
        self.conflicting_fields.iter().any(|f| f == path)
    }

    /// Returns true if a resolution has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Outcome of comparing a local item with the remote snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Local wins: write the local payload to the remote.
    Push,
    /// Remote wins: overwrite the local payload.
    Pull {
        /// Remote payload to adopt.
        payload: Value,
        /// Remote version to adopt.
        version: u64,
    },
    /// Both sides changed since the last common version.
    Conflict(SyncConflict),
}

/// Decides how a local item and a remote snapshot reconcile.
///
/// A missing snapshot means the record never existed remotely. An item that
/// was never synced has a base version of zero.
pub fn reconcile(item: &SyncItem, remote: Option<&RemoteSnapshot>) -> Reconciliation {
    let Some(remote) = remote else {
        return Reconciliation::Push;
    };

    let base = item.base_version();
    if remote.version <= base {
        return Reconciliation::Push;
    }

    if !item.has_local_changes() {
        return Reconciliation::Pull {
            payload: remote.payload.clone(),
            version: remote.version,
        };
    }

    Reconciliation::Conflict(SyncConflict::detect(item, remote))
}

/// Computes the dotted paths whose leaf values differ between two payloads.
///
/// Maps are compared key by key and arrays index by index. A path present on
/// only one side is conflicting, as is a path whose values differ in type.
/// Two differing scalars at the root produce [`ROOT_PATH`].
pub fn diff_fields(local: &Value, remote: &Value) -> Vec<String> {
    let mut fields = Vec::new();
    diff_into(local, remote, None, &mut fields);
    fields
}

fn diff_into(local: &Value, remote: &Value, path: Option<&str>, out: &mut Vec<String>) {
    match (local, remote) {
        (Value::Map(left), Value::Map(right)) => {
            // Both sides are sorted, so a merge walk yields sorted output.
            let left_entries = sorted_entries(left);
            let right_entries = sorted_entries(right);
            let (left, right) = (&*left_entries, &*right_entries);
            let (mut i, mut j) = (0, 0);
            while i < left.len() || j < right.len() {
                let order = match (left.get(i), right.get(j)) {
                    (Some((lk, _)), Some((rk, _))) => lk.cmp(rk),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, _) => std::cmp::Ordering::Greater,
                };
                match order {
                    std::cmp::Ordering::Less => {
                        out.push(join(path, &left[i].0));
                        i += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        out.push(join(path, &right[j].0));
                        j += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        let child = join(path, &left[i].0);
                        diff_into(&left[i].1, &right[j].1, Some(&child), out);
                        i += 1;
                        j += 1;
                    }
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for index in 0..left.len().max(right.len()) {
                let child = join(path, &index.to_string());
                match (left.get(index), right.get(index)) {
                    (Some(l), Some(r)) => diff_into(l, r, Some(&child), out),
                    _ => out.push(child),
                }
            }
        }
        (l, r) => {
            if l != r {
                out.push(path.unwrap_or(ROOT_PATH).to_string());
            }
        }
    }
}

fn join(parent: Option<&str>, segment: &str) -> String {
    match parent {
        Some(p) => format!("{p}.{segment}"),
        None => segment.to_string(),
    }
}

/// Merges two payloads field by field.
///
/// Keys present on one side only are kept. Keys present on both sides merge
/// recursively when both values are maps; any other collision keeps the
/// local value. Non-map payloads resolve to the local payload.
pub fn merge(local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::Map(left), Value::Map(right)) => {
            let mut merged = Value::map(left.iter().cloned());
            for (key, remote_value) in right {
                let value = match local.get(key) {
                    Some(local_value) => merge(local_value, remote_value),
                    None => remote_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            merged
        }
        (l, _) => l.clone(),
    }
}

/// Computes the resolved payload for a conflict.
///
/// For [`ConflictStrategy::Merge`], a caller-supplied payload overrides the
/// default field-wise merge. The conflict itself is not modified.
pub fn resolve(
    conflict: &SyncConflict,
    strategy: ConflictStrategy,
    merged_override: Option<Value>,
) -> Value {
    match strategy {
        ConflictStrategy::TakeLocal => conflict.local_payload.clone(),
        ConflictStrategy::TakeRemote => conflict.remote_payload.clone(),
        ConflictStrategy::Merge => merged_override
            .unwrap_or_else(|| merge(&conflict.local_payload, &conflict.remote_payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemStatus;
    use serde_json::json;

    fn item(local_version: u64, remote_version: Option<u64>, payload: serde_json::Value) -> SyncItem {
        let mut item = SyncItem::new(RecordType::Progress, "L1", Value::from(payload));
        item.local_version = local_version;
        item.remote_version = remote_version;
        item.status = ItemStatus::Syncing;
        item
    }

    fn snapshot(version: u64, payload: serde_json::Value) -> RemoteSnapshot {
        RemoteSnapshot::new(Value::from(payload), version)
    }

    #[test]
    fn absent_remote_pushes() {
        let local = item(1, None, json!({ "score": 10 }));
        assert_eq!(reconcile(&local, None), Reconciliation::Push);
    }

    #[test]
    fn unchanged_remote_pushes() {
        let local = item(3, Some(2), json!({ "score": 10 }));
        let remote = snapshot(2, json!({ "score": 1 }));
        assert_eq!(reconcile(&local, Some(&remote)), Reconciliation::Push);

        // An older remote version also counts as unchanged.
        let remote = snapshot(1, json!({ "score": 1 }));
        assert_eq!(reconcile(&local, Some(&remote)), Reconciliation::Push);
    }

    #[test]
    fn newer_remote_without_local_changes_pulls() {
        let local = item(2, Some(2), json!({ "score": 10 }));
        let remote = snapshot(4, json!({ "score": 40 }));

        match reconcile(&local, Some(&remote)) {
            Reconciliation::Pull { payload, version } => {
                assert_eq!(version, 4);
                assert_eq!(payload, Value::from(json!({ "score": 40 })));
            }
            other => panic!("expected pull, got {other:?}"),
        }
    }

    #[test]
    fn both_sides_changed_conflicts() {
        let local = item(3, Some(1), json!({ "score": 30, "lesson": "L1" }));
        let remote = snapshot(2, json!({ "score": 20, "lesson": "L1" }));

        match reconcile(&local, Some(&remote)) {
            Reconciliation::Conflict(conflict) => {
                assert_eq!(conflict.id, "L1");
                assert_eq!(conflict.local_version, 3);
                assert_eq!(conflict.remote_version, 2);
                assert_eq!(conflict.conflicting_fields, vec!["score".to_string()]);
                assert!(conflict.touches("score"));
                assert!(!conflict.is_resolved());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn never_synced_item_conflicts_with_existing_remote() {
        let local = item(1, None, json!({ "theme": "dark" }));
        let remote = snapshot(1, json!({ "theme": "light" }));
        assert!(matches!(
            reconcile(&local, Some(&remote)),
            Reconciliation::Conflict(_)
        ));
    }

    #[test]
    fn identical_content_still_conflicts_when_both_versions_moved() {
        // Detection is version-only: matching payloads do not suppress it.
        let local = item(2, Some(1), json!({ "score": 10 }));
        let remote = snapshot(2, json!({ "score": 10 }));

        match reconcile(&local, Some(&remote)) {
            Reconciliation::Conflict(conflict) => assert!(conflict.conflicting_fields.is_empty()),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn diff_nested_and_one_sided_fields() {
        let local = Value::from(json!({
            "settings": { "audio": { "volume": 3 }, "lang": "en" },
            "only_local": true
        }));
        let remote = Value::from(json!({
            "settings": { "audio": { "volume": 5 }, "lang": "en" },
            "only_remote": 1
        }));

        assert_eq!(
            diff_fields(&local, &remote),
            vec![
                "only_local".to_string(),
                "only_remote".to_string(),
                "settings.audio.volume".to_string(),
            ]
        );
    }

    #[test]
    fn diff_arrays_by_index() {
        let local = Value::from(json!({ "steps": [1, 2, 3] }));
        let remote = Value::from(json!({ "steps": [1, 9] }));
        assert_eq!(
            diff_fields(&local, &remote),
            vec!["steps.1".to_string(), "steps.2".to_string()]
        );
    }

    #[test]
    fn diff_type_mismatch_is_leaf() {
        let local = Value::from(json!({ "meta": { "a": 1 } }));
        let remote = Value::from(json!({ "meta": "flat" }));
        assert_eq!(diff_fields(&local, &remote), vec!["meta".to_string()]);
    }

    #[test]
    fn diff_root_scalars() {
        assert_eq!(
            diff_fields(&Value::Integer(1), &Value::Integer(2)),
            vec![ROOT_PATH.to_string()]
        );
        assert!(diff_fields(&Value::Integer(1), &Value::Integer(1)).is_empty());
    }

    #[test]
    fn merge_prefers_local_on_collision() {
        let local = Value::from(json!({
            "score": 30,
            "settings": { "volume": 3 },
            "local_only": "x"
        }));
        let remote = Value::from(json!({
            "score": 20,
            "settings": { "volume": 5, "lang": "fr" },
            "remote_only": "y"
        }));

        let merged = merge(&local, &remote);
        assert_eq!(
            merged,
            Value::from(json!({
                "score": 30,
                "settings": { "volume": 3, "lang": "fr" },
                "local_only": "x",
                "remote_only": "y"
            }))
        );
    }

    #[test]
    fn resolve_strategies() {
        let local = item(3, Some(1), json!({ "score": 30 }));
        let remote = snapshot(2, json!({ "score": 20, "badge": "gold" }));
        let Reconciliation::Conflict(conflict) = reconcile(&local, Some(&remote)) else {
            panic!("expected conflict");
        };

        assert_eq!(
            resolve(&conflict, ConflictStrategy::TakeLocal, None),
            Value::from(json!({ "score": 30 }))
        );
        assert_eq!(
            resolve(&conflict, ConflictStrategy::TakeRemote, None),
            Value::from(json!({ "score": 20, "badge": "gold" }))
        );
        assert_eq!(
            resolve(&conflict, ConflictStrategy::Merge, None),
            Value::from(json!({ "score": 30, "badge": "gold" }))
        );

        let manual = Value::from(json!({ "score": 25 }));
        assert_eq!(
            resolve(&conflict, ConflictStrategy::Merge, Some(manual.clone())),
            manual
        );
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("take_local".parse::<ConflictStrategy>(), Ok(ConflictStrategy::TakeLocal));
        assert_eq!("remote".parse::<ConflictStrategy>(), Ok(ConflictStrategy::TakeRemote));
        assert_eq!("merge".parse::<ConflictStrategy>(), Ok(ConflictStrategy::Merge));
        assert!("newest".parse::<ConflictStrategy>().is_err());
        assert_eq!(ConflictStrategy::TakeRemote.to_string(), "take_remote");
    }

    #[test]
    fn hand_built_maps_diff_and_merge_by_key() {
        let local = Value::Map(vec![
            ("score".to_string(), Value::Integer(10)),
            ("lesson".to_string(), Value::from("L1")),
        ]);
        let remote = Value::map([("lesson", Value::from("L1")), ("score", Value::Integer(20))]);

        assert_eq!(diff_fields(&local, &remote), vec!["score"]);

        let same = Value::map([("lesson", Value::from("L1")), ("score", Value::Integer(10))]);
        assert!(diff_fields(&local, &same).is_empty());

        let merged = merge(&local, &remote);
        assert_eq!(
            merged,
            Value::map([("lesson", Value::from("L1")), ("score", Value::Integer(10))])
        );
    }
}
