//! Sync registry: the authoritative local record of tracked items.
//!
//! The registry owns every [`SyncItem`] and open [`SyncConflict`]. All state
//! changes go through its methods; each mutation is applied in memory first
//! and then persisted as a full snapshot to the [`LocalStore`]. Persistence
//! failures are logged and never fail the mutation.
//!
//! The orchestrator drives items through their lifecycle with the claim and
//! `mark_*` helpers. A claim moves an item to `Syncing` atomically and is
//! refused while another reconciliation holds it, so at most one attempt per
//! item is in flight.

use crate::error::{SyncError, SyncResult};
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use versync_protocol::{
    ConflictStrategy, ItemStatus, RecordType, RegistrySnapshot, SyncConflict, SyncItem,
    SyncStatus, Value,
};

/// Kind of item change announced to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The item was tracked or mutated locally.
    Tracked,
    /// An in-flight attempt was overtaken by a local mutation and the item
    /// went back to `Pending`.
    Requeued,
}

/// Notification that an item needs reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    /// Item id.
    pub id: String,
    /// Record type of the item.
    pub record_type: RecordType,
    /// What happened.
    pub kind: ChangeKind,
}

/// Result of trying to claim an item for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The item is now `Syncing`; holds its state just before the claim.
    Claimed(SyncItem),
    /// The item cannot be claimed in its current status.
    Refused(ItemStatus),
}

/// Result of completing an attempt on a claimed item.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The outcome was applied; holds the updated item.
    Applied(SyncItem),
    /// A local mutation landed while the attempt was in flight. The item is
    /// `Pending` again and the outcome was discarded.
    Superseded,
}

#[derive(Debug, Default)]
struct RegistryState {
    items: BTreeMap<String, SyncItem>,
    conflicts: BTreeMap<String, SyncConflict>,
    last_sync_at: Option<DateTime<Utc>>,
}

impl RegistryState {
    fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let snapshot = snapshot.normalize();
        Self {
            items: snapshot
                .items
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect(),
            conflicts: snapshot
                .conflicts
                .into_iter()
                .map(|conflict| (conflict.id.clone(), conflict))
                .collect(),
            last_sync_at: snapshot.last_sync_at,
        }
    }

    fn to_snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            items: self.items.values().cloned().collect(),
            conflicts: self.conflicts.values().cloned().collect(),
            last_sync_at: self.last_sync_at,
            ..RegistrySnapshot::empty()
        }
    }

    fn item_mut(&mut self, id: &str) -> SyncResult<&mut SyncItem> {
        self.items
            .get_mut(id)
            .ok_or_else(|| SyncError::ItemNotFound(id.to_string()))
    }

    /// Looks up a claimed item and reports whether it was mutated since the
    /// claim. A superseded item is returned to `Pending`.
    fn claimed_mut(&mut self, id: &str, claimed_version: u64) -> SyncResult<Option<&mut SyncItem>> {
        let item = self.item_mut(id)?;
        if item.local_version != claimed_version {
            item.status = ItemStatus::Pending;
            return Ok(None);
        }
        Ok(Some(item))
    }
}

/// The authoritative, persisted record of tracked items and conflicts.
pub struct SyncRegistry {
    state: RwLock<RegistryState>,
    store: Arc<dyn LocalStore>,
    persist_lock: Mutex<()>,
    subscribers: RwLock<Vec<UnboundedSender<ItemChange>>>,
}

impl SyncRegistry {
    /// Opens the registry from the store.
    ///
    /// An unreadable or malformed snapshot is logged and replaced by an empty
    /// registry.
    pub fn open(store: Arc<dyn LocalStore>) -> Self {
        let snapshot = match store.load_snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => RegistrySnapshot::empty(),
            Err(e) => {
                warn!(error = %e, "failed to load registry snapshot, starting empty");
                RegistrySnapshot::empty()
            }
        };

        let state = RegistryState::from_snapshot(snapshot);
        debug!(
            items = state.items.len(),
            conflicts = state.conflicts.len(),
            "registry opened"
        );

        Self {
            state: RwLock::new(state),
            store,
            persist_lock: Mutex::new(()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Records a local mutation.
    ///
    /// A new id starts at version 1; an existing id gets its version bumped
    /// and its failure state cleared. Either way the item becomes `Pending`.
    /// An open conflict on the item is discarded, since the new edit
    /// supersedes both sides of it. An item currently in flight stays
    /// `Syncing`; the attempt will notice the mutation when it completes.
    pub fn track(&self, record_type: RecordType, id: &str, payload: Value) -> SyncItem {
        let item = {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let item = match state.items.get_mut(id) {
                Some(item) => {
                    let in_flight = item.status == ItemStatus::Syncing;
                    item.record_type = record_type;
                    item.record_mutation(payload);
                    if in_flight {
                        item.status = ItemStatus::Syncing;
                    }
                    item.clone()
                }
                None => {
                    let item = SyncItem::new(record_type, id, payload);
                    state.items.insert(id.to_string(), item.clone());
                    item
                }
            };
            if state.conflicts.remove(id).is_some() {
                debug!(id, "local edit discarded open conflict");
            }
            item
        };

        debug!(id, version = item.local_version, "item tracked");
        self.persist();
        self.notify(&item, ChangeKind::Tracked);
        item
    }

    /// Returns a tracked item.
    pub fn get(&self, id: &str) -> Option<SyncItem> {
        self.state.read().items.get(id).cloned()
    }

    /// Returns all tracked items, ordered by id.
    pub fn list(&self) -> Vec<SyncItem> {
        self.state.read().items.values().cloned().collect()
    }

    /// Returns the items with the given status.
    pub fn list_by_status(&self, status: ItemStatus) -> Vec<SyncItem> {
        self.filter(|item| item.status == status)
    }

    /// Returns the items of the given record type.
    pub fn list_by_type(&self, record_type: RecordType) -> Vec<SyncItem> {
        self.filter(|item| item.record_type == record_type)
    }

    /// Returns the items matching a predicate.
    pub fn filter(&self, mut predicate: impl FnMut(&SyncItem) -> bool) -> Vec<SyncItem> {
        self.state
            .read()
            .items
            .values()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    /// Returns all open conflicts, ordered by item id.
    pub fn conflicts(&self) -> Vec<SyncConflict> {
        self.state.read().conflicts.values().cloned().collect()
    }

    /// Returns the open conflict for an item.
    pub fn conflict(&self, id: &str) -> Option<SyncConflict> {
        self.state.read().conflicts.get(id).cloned()
    }

    /// Returns true if any item is `Pending` or `Error`.
    pub fn has_outstanding_work(&self) -> bool {
        self.state
            .read()
            .items
            .values()
            .any(|item| item.status.is_outstanding())
    }

    /// Returns the number of tracked items.
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Returns true if no items are tracked.
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// Completion time of the last full sync pass.
    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_sync_at
    }

    /// Records the completion of a full sync pass.
    pub fn set_last_sync_at(&self, at: DateTime<Utc>) {
        self.state.write().last_sync_at = Some(at);
        self.persist();
    }

    /// Computes the status view.
    pub fn status(&self, online: bool, syncing: bool) -> SyncStatus {
        let state = self.state.read();
        SyncStatus::compute(state.items.values(), online, syncing, state.last_sync_at)
    }

    /// Removes every item and conflict, and clears the store.
    pub fn reset(&self) -> SyncResult<()> {
        {
            let _guard = self.persist_lock.lock();
            *self.state.write() = RegistryState::default();
            self.store.clear()?;
        }
        debug!("registry reset");
        Ok(())
    }

    /// Subscribes to item changes that call for an eager sync.
    pub fn subscribe_changes(&self) -> UnboundedReceiver<ItemChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Moves an item to `Syncing`.
    ///
    /// Items that are `Syncing` or `Conflict` are refused, as are `Synced`
    /// items unless `allow_synced` is set.
    pub fn claim(&self, id: &str, allow_synced: bool) -> SyncResult<Claim> {
        let mut state = self.state.write();
        let item = state.item_mut(id)?;
        let claimable = match item.status {
            ItemStatus::Pending | ItemStatus::Error => true,
            ItemStatus::Synced => allow_synced,
            ItemStatus::Syncing | ItemStatus::Conflict => false,
        };
        if !claimable {
            return Ok(Claim::Refused(item.status));
        }
        let before = item.clone();
        item.status = ItemStatus::Syncing;
        Ok(Claim::Claimed(before))
    }

    /// Completes an acknowledged push of `claimed_version`.
    ///
    /// The pushed version becomes the common base. If the item changed while
    /// in flight, it stays `Pending`.
    pub fn mark_pushed(&self, id: &str, claimed_version: u64) -> SyncResult<Transition> {
        let now = Utc::now();
        let transition = {
            let mut state = self.state.write();
            let item = state.item_mut(id)?;
            item.remote_version = Some(claimed_version);
            item.last_synced_at = Some(now);
            if item.local_version == claimed_version {
                item.status = ItemStatus::Synced;
                item.retry_count = 0;
                item.last_error = None;
                Transition::Applied(item.clone())
            } else {
                item.status = ItemStatus::Pending;
                Transition::Superseded
            }
        };
        self.complete(id, &transition);
        Ok(transition)
    }

    /// Completes a pull by adopting the remote payload and version.
    pub fn mark_pulled(
        &self,
        id: &str,
        claimed_version: u64,
        payload: Value,
        version: u64,
    ) -> SyncResult<Transition> {
        let now = Utc::now();
        let transition = {
            let mut state = self.state.write();
            match state.claimed_mut(id, claimed_version)? {
                Some(item) => {
                    item.payload = payload;
                    item.local_version = version;
                    item.remote_version = Some(version);
                    item.last_synced_at = Some(now);
                    item.status = ItemStatus::Synced;
                    item.retry_count = 0;
                    item.last_error = None;
                    Transition::Applied(item.clone())
                }
                None => Transition::Superseded,
            }
        };
        self.complete(id, &transition);
        Ok(transition)
    }

    /// Completes an attempt that found a conflict.
    pub fn mark_conflict(
        &self,
        claimed_version: u64,
        conflict: SyncConflict,
    ) -> SyncResult<Transition> {
        let id = conflict.id.clone();
        let transition = {
            let mut state = self.state.write();
            let applied = match state.claimed_mut(&id, claimed_version)? {
                Some(item) => {
                    item.status = ItemStatus::Conflict;
                    item.retry_count = 0;
                    item.last_error = None;
                    Some(item.clone())
                }
                None => None,
            };
            match applied {
                Some(item) => {
                    state.conflicts.insert(id.clone(), conflict);
                    Transition::Applied(item)
                }
                None => Transition::Superseded,
            }
        };
        self.complete(&id, &transition);
        Ok(transition)
    }

    /// Completes a failed attempt, bumping the retry count.
    pub fn mark_failed(
        &self,
        id: &str,
        claimed_version: u64,
        message: &str,
    ) -> SyncResult<Transition> {
        let transition = {
            let mut state = self.state.write();
            match state.claimed_mut(id, claimed_version)? {
                Some(item) => {
                    item.status = ItemStatus::Error;
                    item.retry_count += 1;
                    item.last_error = Some(message.to_string());
                    Transition::Applied(item.clone())
                }
                None => Transition::Superseded,
            }
        };
        self.complete(id, &transition);
        Ok(transition)
    }

    /// Releases a claimed item without an outcome.
    ///
    /// The item returns to `status`, or to `Pending` if it was mutated
    /// since the claim. Items no longer `Syncing` are left alone.
    pub fn release(&self, id: &str, claimed_version: u64, status: ItemStatus) -> SyncResult<()> {
        let released = {
            let mut state = self.state.write();
            let item = state.item_mut(id)?;
            if item.status != ItemStatus::Syncing {
                false
            } else {
                item.status = if item.local_version == claimed_version {
                    status
                } else {
                    ItemStatus::Pending
                };
                true
            }
        };
        if released {
            debug!(id, "claim released");
            self.persist();
        }
        Ok(())
    }

    /// Applies a resolved payload to a conflicted item.
    ///
    /// The conflict's remote version becomes the common base and the local
    /// version moves past it, so the next attempt pushes. Returns the
    /// conflict with its resolution recorded.
    pub fn apply_resolution(
        &self,
        id: &str,
        payload: Value,
        strategy: ConflictStrategy,
    ) -> SyncResult<SyncConflict> {
        let conflict = {
            let mut state = self.state.write();
            let mut conflict = state
                .conflicts
                .remove(id)
                .ok_or_else(|| SyncError::ConflictNotFound(id.to_string()))?;
            conflict.resolution = Some(strategy);

            let item = state.item_mut(id)?;
            item.local_version = item.local_version.max(conflict.remote_version) + 1;
            item.remote_version = Some(conflict.remote_version);
            item.payload = payload;
            item.status = ItemStatus::Pending;
            item.retry_count = 0;
            item.last_error = None;
            item.last_modified_at = Utc::now();
            conflict
        };

        debug!(id, %strategy, "conflict resolved");
        self.persist();
        Ok(conflict)
    }

    fn complete(&self, id: &str, transition: &Transition) {
        self.persist();
        if *transition == Transition::Superseded {
            debug!(id, "attempt superseded by local edit");
            if let Some(item) = self.get(id) {
                self.notify(&item, ChangeKind::Requeued);
            }
        }
    }

    /// Writes the current state to the store.
    ///
    /// The snapshot is taken under the persist lock, so the last write always
    /// reflects the latest state.
    fn persist(&self) {
        let _guard = self.persist_lock.lock();
        let snapshot = self.state.read().to_snapshot();
        if let Err(e) = self.store.save_snapshot(&snapshot) {
            warn!(error = %e, "failed to persist registry snapshot");
        }
    }

    fn notify(&self, item: &SyncItem, kind: ChangeKind) {
        let change = ItemChange {
            id: item.id.clone(),
            record_type: item.record_type,
            kind,
        };
        self.subscribers
            .write()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }
}

impl std::fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SyncRegistry")
            .field("items", &state.items.len())
            .field("conflicts", &state.conflicts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use versync_protocol::RemoteSnapshot;

    fn registry() -> (SyncRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SyncRegistry::open(store.clone()), store)
    }

    fn claimed(registry: &SyncRegistry, id: &str) -> SyncItem {
        match registry.claim(id, false).unwrap() {
            Claim::Claimed(item) => item,
            other => panic!("expected claim, got {other:?}"),
        }
    }

    #[test]
    fn track_increments_version_by_one() {
        let (registry, _) = registry();
        for expected in 1..=5 {
            let item = registry.track(RecordType::Progress, "L1", Value::Integer(expected));
            assert_eq!(item.local_version, expected as u64);
            assert_eq!(item.status, ItemStatus::Pending);
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn track_persists_and_reopens() {
        let (registry, store) = registry();
        registry.track(RecordType::Preference, "theme", Value::from("dark"));
        assert_eq!(store.save_count(), 1);

        let reopened = SyncRegistry::open(store.clone());
        let item = reopened.get("theme").unwrap();
        assert_eq!(item.payload, Value::from("dark"));
        assert!(reopened.has_outstanding_work());
    }

    #[test]
    fn corrupt_store_opens_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_loads(true);
        let registry = SyncRegistry::open(store);
        assert!(registry.is_empty());
    }

    #[test]
    fn persist_failure_does_not_fail_mutation() {
        let (registry, store) = registry();
        store.set_fail_saves(true);
        let item = registry.track(RecordType::Progress, "L1", Value::Null);
        assert_eq!(item.local_version, 1);
        assert!(registry.get("L1").is_some());
    }

    #[test]
    fn list_filters() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "a", Value::Null);
        registry.track(RecordType::Project, "b", Value::Null);
        let item = claimed(&registry, "b");
        registry.mark_pushed("b", item.local_version).unwrap();

        assert_eq!(registry.list().len(), 2);
        assert_eq!(registry.list_by_type(RecordType::Project)[0].id, "b");
        assert_eq!(registry.list_by_status(ItemStatus::Pending)[0].id, "a");
        assert_eq!(registry.list_by_status(ItemStatus::Synced).len(), 1);
    }

    #[test]
    fn claim_is_exclusive() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Null);

        claimed(&registry, "L1");
        assert_eq!(
            registry.claim("L1", true).unwrap(),
            Claim::Refused(ItemStatus::Syncing)
        );
        assert!(matches!(
            registry.claim("missing", false),
            Err(SyncError::ItemNotFound(_))
        ));
    }

    #[test]
    fn synced_items_need_permission() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Null);
        let item = claimed(&registry, "L1");
        registry.mark_pushed("L1", item.local_version).unwrap();

        assert_eq!(
            registry.claim("L1", false).unwrap(),
            Claim::Refused(ItemStatus::Synced)
        );
        assert!(matches!(
            registry.claim("L1", true).unwrap(),
            Claim::Claimed(_)
        ));
    }

    #[test]
    fn push_completion_records_remote_version() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Null);
        let item = claimed(&registry, "L1");

        let Transition::Applied(item) = registry.mark_pushed("L1", item.local_version).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(item.status, ItemStatus::Synced);
        assert_eq!(item.remote_version, Some(1));
        assert!(item.last_synced_at.is_some());
        assert!(!registry.has_outstanding_work());
    }

    #[test]
    fn mutation_in_flight_wins() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Integer(1));
        let mut changes = registry.subscribe_changes();
        let item = claimed(&registry, "L1");

        let during = registry.track(RecordType::Progress, "L1", Value::Integer(2));
        assert_eq!(during.status, ItemStatus::Syncing);
        assert_eq!(changes.try_recv().unwrap().kind, ChangeKind::Tracked);

        let transition = registry.mark_pushed("L1", item.local_version).unwrap();
        assert_eq!(transition, Transition::Superseded);
        assert_eq!(changes.try_recv().unwrap().kind, ChangeKind::Requeued);

        let item = registry.get("L1").unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.remote_version, Some(1));
        assert_eq!(item.local_version, 2);
        assert_eq!(item.payload, Value::Integer(2));
    }

    #[test]
    fn pull_adopts_remote_version() {
        let (registry, store) = registry();
        registry.track(RecordType::Progress, "L1", Value::Integer(1));
        let item = claimed(&registry, "L1");

        registry
            .mark_pulled("L1", item.local_version, Value::Integer(9), 4)
            .unwrap();
        let item = registry.get("L1").unwrap();
        assert_eq!(item.payload, Value::Integer(9));
        assert_eq!(item.local_version, 4);
        assert_eq!(item.remote_version, Some(4));
        assert_eq!(item.status, ItemStatus::Synced);

        let persisted = store.snapshot().unwrap();
        assert_eq!(persisted.items[0].status, ItemStatus::Synced);
    }

    #[test]
    fn failures_count_up() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Null);

        for expected in 1..=3 {
            let item = claimed(&registry, "L1");
            let Transition::Applied(item) = registry
                .mark_failed("L1", item.local_version, "offline")
                .unwrap()
            else {
                panic!("expected applied");
            };
            assert_eq!(item.retry_count, expected);
            assert_eq!(item.status, ItemStatus::Error);
            assert_eq!(item.last_error.as_deref(), Some("offline"));
        }
        assert!(registry.has_outstanding_work());
    }

    #[test]
    fn conflict_lifecycle() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Integer(1));
        let item = claimed(&registry, "L1");
        let conflict = SyncConflict::detect(&item, &RemoteSnapshot::new(Value::Integer(7), 2));

        registry.mark_conflict(item.local_version, conflict).unwrap();
        assert_eq!(registry.get("L1").unwrap().status, ItemStatus::Conflict);
        assert_eq!(registry.conflicts().len(), 1);
        assert!(!registry.has_outstanding_work());
        assert_eq!(
            registry.claim("L1", true).unwrap(),
            Claim::Refused(ItemStatus::Conflict)
        );

        let resolved = registry
            .apply_resolution("L1", Value::Integer(7), ConflictStrategy::TakeRemote)
            .unwrap();
        assert_eq!(resolved.resolution, Some(ConflictStrategy::TakeRemote));

        let item = registry.get("L1").unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.payload, Value::Integer(7));
        assert_eq!(item.remote_version, Some(2));
        assert_eq!(item.local_version, 3);
        assert!(registry.conflict("L1").is_none());

        assert!(matches!(
            registry.apply_resolution("L1", Value::Null, ConflictStrategy::TakeLocal),
            Err(SyncError::ConflictNotFound(_))
        ));
    }

    #[test]
    fn local_edit_discards_conflict() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Integer(1));
        let item = claimed(&registry, "L1");
        let conflict = SyncConflict::detect(&item, &RemoteSnapshot::new(Value::Integer(7), 2));
        registry.mark_conflict(item.local_version, conflict).unwrap();

        let item = registry.track(RecordType::Progress, "L1", Value::Integer(3));
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(registry.conflicts().is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let (registry, store) = registry();
        registry.track(RecordType::Progress, "L1", Value::Null);
        registry.set_last_sync_at(Utc::now());

        registry.reset().unwrap();
        assert!(registry.is_empty());
        assert!(registry.last_sync_at().is_none());
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn release_restores_status() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Null);
        let item = claimed(&registry, "L1");
        assert_eq!(item.status, ItemStatus::Pending);

        registry.release("L1", item.local_version, item.status).unwrap();
        assert_eq!(registry.get("L1").unwrap().status, ItemStatus::Pending);
    }

    #[test]
    fn release_of_synced_item_keeps_in_flight_edit() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Integer(1));
        let item = claimed(&registry, "L1");
        registry.mark_pushed("L1", item.local_version).unwrap();

        let Claim::Claimed(item) = registry.claim("L1", true).unwrap() else {
            panic!("expected claim");
        };
        assert_eq!(item.status, ItemStatus::Synced);
        registry.track(RecordType::Progress, "L1", Value::Integer(2));

        registry.release("L1", item.local_version, item.status).unwrap();
        assert_eq!(registry.get("L1").unwrap().status, ItemStatus::Pending);
    }

    #[test]
    fn push_completion_uses_pushed_version() {
        let (registry, _) = registry();
        registry.track(RecordType::Progress, "L1", Value::Integer(1));
        registry.track(RecordType::Progress, "L1", Value::Integer(2));
        let item = claimed(&registry, "L1");

        registry.mark_pushed("L1", item.local_version).unwrap();
        let item = registry.get("L1").unwrap();
        assert_eq!(item.remote_version, Some(2));
        assert_eq!(item.remote_version, Some(item.local_version));
    }
}
