//! Persisted registry snapshot.

use crate::conflict::SyncConflict;
use crate::item::{ItemStatus, SyncItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Full registry state as written to the local durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Snapshot format version.
    pub format_version: u32,
    /// Tracked items.
    pub items: Vec<SyncItem>,
    /// Open conflicts.
    #[serde(default)]
    pub conflicts: Vec<SyncConflict>,
    /// Completion time of the last full sync pass.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl RegistrySnapshot {
    /// Creates an empty snapshot.
    pub fn empty() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            items: Vec::new(),
            conflicts: Vec::new(),
            last_sync_at: None,
        }
    }

    /// Repairs state that cannot survive a restart.
    ///
    /// Items persisted mid-flight go back to `Pending`; conflicts whose item
    /// is no longer in `Conflict` are dropped, as are duplicate item ids
    /// (the first occurrence wins).
    pub fn normalize(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.items.retain(|item| seen.insert(item.id.clone()));

        for item in &mut self.items {
            if item.status == ItemStatus::Syncing {
                item.status = ItemStatus::Pending;
            }
        }

        let items = &self.items;
        self.conflicts.retain(|conflict| {
            items
                .iter()
                .any(|item| item.id == conflict.id && item.status == ItemStatus::Conflict)
        });
        self
    }
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{RecordType, RemoteSnapshot};
    use crate::value::Value;

    #[test]
    fn normalize_repairs_in_flight_items() {
        let mut syncing = SyncItem::new(RecordType::Progress, "a", Value::Null);
        syncing.status = ItemStatus::Syncing;

        let snapshot = RegistrySnapshot {
            items: vec![syncing],
            ..RegistrySnapshot::empty()
        }
        .normalize();

        assert_eq!(snapshot.items[0].status, ItemStatus::Pending);
    }

    #[test]
    fn normalize_drops_orphan_conflicts_and_duplicates() {
        let mut in_conflict = SyncItem::new(RecordType::Progress, "a", Value::Integer(1));
        in_conflict.status = ItemStatus::Conflict;
        let pending = SyncItem::new(RecordType::Progress, "b", Value::Integer(2));
        let duplicate = SyncItem::new(RecordType::Progress, "b", Value::Integer(3));

        let remote = RemoteSnapshot::new(Value::Integer(9), 2);
        let kept = SyncConflict::detect(&in_conflict, &remote);
        let orphan = SyncConflict::detect(&pending, &remote);

        let snapshot = RegistrySnapshot {
            items: vec![in_conflict, pending, duplicate],
            conflicts: vec![kept, orphan],
            ..RegistrySnapshot::empty()
        }
        .normalize();

        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.items[1].payload, Value::Integer(2));
        assert_eq!(snapshot.conflicts.len(), 1);
        assert_eq!(snapshot.conflicts[0].id, "a");
    }

    #[test]
    fn json_round_trip() {
        let mut snapshot = RegistrySnapshot::empty();
        snapshot
            .items
            .push(SyncItem::new(RecordType::Project, "p1", Value::from("draft")));

        let text = serde_json::to_string(&snapshot).unwrap();
        let back: RegistrySnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snapshot);
    }
}
