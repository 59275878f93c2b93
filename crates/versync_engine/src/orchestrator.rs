//! Sync orchestrator.
//!
//! Drives each tracked item through
//! `Pending -> Syncing -> {Synced | Conflict | Error}`:
//!
//! 1. Claim the item (`Syncing`)
//! 2. Fetch the remote snapshot
//! 3. Reconcile: push, pull or register a conflict
//! 4. On transport failure, record the error and schedule a bounded retry
//!
//! Full passes (`sync_all`) run batches sequentially with the items of one
//! batch reconciled concurrently. At most one full pass runs at a time.

use crate::config::{SyncConfig, SyncOptions};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::gate::{AlwaysEnabled, FeatureGate};
use crate::monitor::ConnectivityMonitor;
use crate::registry::{Claim, SyncRegistry, Transition};
use crate::store::{LocalStore, MemoryStore};
use crate::transport::RemoteTransport;
use chrono::Utc;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use versync_protocol::{
    reconcile, resolve, ConflictStrategy, ItemStatus, Reconciliation, RecordType, SyncConflict,
    SyncItem, SyncStatus, Value,
};

/// Why an item was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The device is offline.
    Offline,
    /// Sync is disabled for the record type.
    Disabled,
    /// Another attempt holds the item.
    InFlight,
    /// The item is already synced.
    UpToDate,
    /// The item awaits conflict resolution.
    Conflicted,
}

impl SkipReason {
    fn for_status(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Synced => SkipReason::UpToDate,
            ItemStatus::Conflict => SkipReason::Conflicted,
            _ => SkipReason::InFlight,
        }
    }
}

/// Outcome of reconciling one item.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The local payload was pushed and acknowledged.
    Pushed {
        /// Acknowledged remote version.
        version: u64,
    },
    /// The remote payload was adopted.
    Pulled {
        /// Adopted version.
        version: u64,
    },
    /// Both sides changed; the conflict awaits resolution.
    Conflict(SyncConflict),
    /// The attempt failed.
    Failed {
        /// Failure message.
        message: String,
        /// Consecutive failures so far.
        retry_count: u32,
        /// Whether another attempt is scheduled.
        will_retry: bool,
    },
    /// A local edit landed during the attempt; the item is pending again.
    Superseded,
    /// The item was not attempted.
    Skipped(SkipReason),
}

impl SyncOutcome {
    /// Returns true if the item ended in agreement with the remote.
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Pushed { .. } | SyncOutcome::Pulled { .. })
    }
}

/// A failed item in a full pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Item id.
    pub id: String,
    /// Failure message.
    pub message: String,
}

/// Summary of a full sync pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncAllResult {
    /// Items that reached `Synced`.
    pub synced: usize,
    /// Items that entered `Conflict`.
    pub conflicted: usize,
    /// Items whose attempt failed.
    pub errored: usize,
    /// Items not attempted.
    pub skipped: usize,
    /// Conflicts detected in this pass.
    pub conflicts: Vec<SyncConflict>,
    /// Failures in this pass.
    pub errors: Vec<ItemFailure>,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl SyncAllResult {
    fn record(&mut self, id: &str, outcome: SyncResult<SyncOutcome>) {
        match outcome {
            Ok(SyncOutcome::Pushed { .. } | SyncOutcome::Pulled { .. }) => self.synced += 1,
            Ok(SyncOutcome::Conflict(conflict)) => {
                self.conflicted += 1;
                self.conflicts.push(conflict);
            }
            Ok(SyncOutcome::Failed { message, .. }) => {
                self.errored += 1;
                self.errors.push(ItemFailure {
                    id: id.to_string(),
                    message,
                });
            }
            Ok(SyncOutcome::Superseded | SyncOutcome::Skipped(_))
            | Err(SyncError::ItemNotFound(_)) => self.skipped += 1,
            Err(e) => {
                self.errored += 1;
                self.errors.push(ItemFailure {
                    id: id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Number of items the pass looked at.
    pub fn total(&self) -> usize {
        self.synced + self.conflicted + self.errored + self.skipped
    }
}

/// Holds the full-pass flag for the lifetime of a pass.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Returns a claimed item to its previous status if the attempt is dropped
/// before it records an outcome.
struct ClaimGuard<'a> {
    registry: &'a SyncRegistry,
    item: &'a SyncItem,
    armed: bool,
}

impl<'a> ClaimGuard<'a> {
    fn new(registry: &'a SyncRegistry, item: &'a SyncItem) -> Self {
        Self {
            registry,
            item,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let item = self.item;
        if let Err(e) = self
            .registry
            .release(&item.id, item.local_version, item.status)
        {
            debug!(id = %item.id, error = %e, "abandoned claim not released");
        }
    }
}

struct Inner {
    registry: Arc<SyncRegistry>,
    monitor: Arc<ConnectivityMonitor>,
    transport: Arc<dyn RemoteTransport>,
    store: Arc<dyn LocalStore>,
    gate: Arc<dyn FeatureGate>,
    events: Arc<EventBus>,
    config: SyncConfig,
    syncing: AtomicBool,
}

/// Builder for [`SyncOrchestrator`].
pub struct SyncOrchestratorBuilder {
    transport: Arc<dyn RemoteTransport>,
    store: Option<Arc<dyn LocalStore>>,
    gate: Option<Arc<dyn FeatureGate>>,
    config: SyncConfig,
    online: bool,
}

impl SyncOrchestratorBuilder {
    /// Sets the local durable store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the feature gate. Defaults to enabling every record type.
    pub fn gate(mut self, gate: Arc<dyn FeatureGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the initial reachability. Defaults to online.
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Opens the registry from the store and builds the orchestrator.
    pub fn build(self) -> SyncOrchestrator {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let gate = self.gate.unwrap_or_else(|| Arc::new(AlwaysEnabled));
        let events = Arc::new(EventBus::new());
        let monitor = ConnectivityMonitor::new(self.online).with_events(Arc::clone(&events));
        let registry = SyncRegistry::open(Arc::clone(&store));

        SyncOrchestrator {
            inner: Arc::new(Inner {
                registry: Arc::new(registry),
                monitor: Arc::new(monitor),
                transport: self.transport,
                store,
                gate,
                events,
                config: self.config,
                syncing: AtomicBool::new(false),
            }),
        }
    }
}

/// Reconciles tracked items with the remote authority.
///
/// Cheap to clone; all clones share the same registry, monitor and
/// transport.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Starts building an orchestrator around a transport.
    pub fn builder(transport: Arc<dyn RemoteTransport>) -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder {
            transport,
            store: None,
            gate: None,
            config: SyncConfig::default(),
            online: true,
        }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<SyncRegistry> {
        &self.inner.registry
    }

    /// Returns the connectivity monitor.
    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.inner.monitor
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Subscribes to engine events.
    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Reports network reachability.
    pub fn set_online(&self, online: bool) -> bool {
        self.inner.monitor.set_online(online)
    }

    /// Returns true if the device is online.
    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    /// Returns true if a full pass is running.
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Records a local mutation and announces it.
    pub fn track(&self, record_type: RecordType, id: &str, payload: Value) -> SyncItem {
        let item = self.inner.registry.track(record_type, id, payload);
        self.inner.events.publish(SyncEvent::ItemAdded {
            id: item.id.clone(),
            record_type: item.record_type,
            local_version: item.local_version,
        });
        item
    }

    /// Returns the current status view.
    pub fn status(&self) -> SyncStatus {
        self.inner
            .registry
            .status(self.is_online(), self.is_syncing())
    }

    /// Returns the items still waiting to be pushed or retried.
    pub fn pending_items(&self) -> Vec<SyncItem> {
        self.inner.registry.filter(|item| item.status.is_outstanding())
    }

    /// Returns all open conflicts.
    pub fn conflicts(&self) -> Vec<SyncConflict> {
        self.inner.registry.conflicts()
    }

    /// Clears every tracked item, conflict and stored record.
    pub fn reset(&self) -> SyncResult<()> {
        self.inner.registry.reset()?;
        self.inner.events.publish(SyncEvent::DataCleared);
        info!("sync data cleared");
        Ok(())
    }

    /// Runs a full sync pass.
    ///
    /// Fails with [`SyncError::SyncInProgress`] if a pass is already running
    /// and with [`SyncError::Offline`] when offline. Items of disabled record
    /// types are counted as skipped.
    pub async fn sync_all(&self, options: SyncOptions) -> SyncResult<SyncAllResult> {
        let inner = &self.inner;
        let _pass = PassGuard::acquire(&inner.syncing).ok_or(SyncError::SyncInProgress)?;
        if !inner.monitor.is_online() {
            return Err(SyncError::Offline);
        }

        let started = Instant::now();
        let mut result = SyncAllResult::default();

        let (candidates, gated): (Vec<SyncItem>, Vec<SyncItem>) = inner
            .registry
            .filter(|item| {
                let eligible = if options.force_all {
                    !matches!(item.status, ItemStatus::Conflict | ItemStatus::Syncing)
                } else {
                    item.status.is_outstanding()
                };
                eligible && options.includes(item.record_type)
            })
            .into_iter()
            .partition(|item| inner.gate.is_sync_enabled(item.record_type));
        result.skipped += gated.len();

        inner.events.publish(SyncEvent::SyncStart {
            candidates: candidates.len(),
        });
        info!(
            candidates = candidates.len(),
            force_all = options.force_all,
            "sync pass started"
        );

        let mut processed = 0;
        for (index, batch) in candidates.chunks(options.batch_size.max(1)).enumerate() {
            if index > 0 && !inner.config.batch_delay.is_zero() {
                tokio::time::sleep(inner.config.batch_delay).await;
            }
            if !inner.monitor.is_online() {
                debug!("went offline, stopping sync pass");
                break;
            }

            let outcomes = join_all(batch.iter().map(|item| {
                self.sync_item(&item.id, options.force_all, options.max_retries)
            }))
            .await;

            for (item, outcome) in batch.iter().zip(outcomes) {
                result.record(&item.id, outcome);
            }
            processed += batch.len();
        }
        result.skipped += candidates.len() - processed;
        result.duration = started.elapsed();

        inner.registry.set_last_sync_at(Utc::now());
        inner.events.publish(SyncEvent::SyncComplete {
            synced: result.synced,
            conflicted: result.conflicted,
            errored: result.errored,
            duration: result.duration,
        });
        info!(
            synced = result.synced,
            conflicted = result.conflicted,
            errored = result.errored,
            skipped = result.skipped,
            duration_ms = result.duration.as_millis() as u64,
            "sync pass complete"
        );
        Ok(result)
    }

    /// Reconciles one item outside a full pass.
    ///
    /// Skipped when offline, when the record type is disabled, or when the
    /// item is in flight, synced or conflicted.
    pub async fn sync_one(&self, id: &str) -> SyncResult<SyncOutcome> {
        self.sync_item(id, false, self.inner.config.retry.max_attempts)
            .await
    }

    /// Resolves an open conflict and immediately tries to sync the result.
    ///
    /// For [`ConflictStrategy::Merge`], `merged_payload` replaces the default
    /// field-wise merge when given.
    pub async fn resolve_conflict(
        &self,
        id: &str,
        strategy: ConflictStrategy,
        merged_payload: Option<Value>,
    ) -> SyncResult<SyncOutcome> {
        let inner = &self.inner;
        let conflict = inner
            .registry
            .conflict(id)
            .ok_or_else(|| SyncError::ConflictNotFound(id.to_string()))?;

        let payload = resolve(&conflict, strategy, merged_payload);
        inner.registry.apply_resolution(id, payload, strategy)?;
        inner.events.publish(SyncEvent::ConflictResolved {
            id: id.to_string(),
            strategy,
        });
        info!(id, %strategy, "conflict resolved");

        self.sync_one(id).await
    }

    /// Runs one final forced pass bounded by the teardown timeout.
    ///
    /// Returns true if the pass completed. Failures are logged and dropped.
    /// Items claimed by an abandoned pass return to their previous status.
    pub async fn shutdown(&self) -> bool {
        self.shutdown_until(Instant::now() + self.inner.config.teardown_timeout)
            .await
    }

    pub(crate) async fn shutdown_until(&self, deadline: Instant) -> bool {
        let options = SyncOptions {
            force_all: true,
            ..self.inner.config.default_options()
        };

        match tokio::time::timeout_at(deadline, self.sync_all(options)).await {
            Ok(Ok(result)) => {
                debug!(synced = result.synced, "final sync complete");
                true
            }
            Ok(Err(e)) => {
                debug!(error = %e, "final sync skipped");
                false
            }
            Err(_) => {
                warn!("final sync timed out");
                false
            }
        }
    }

    async fn sync_item(
        &self,
        id: &str,
        allow_synced: bool,
        max_retries: u32,
    ) -> SyncResult<SyncOutcome> {
        let inner = &self.inner;
        let record_type = inner
            .registry
            .get(id)
            .ok_or_else(|| SyncError::ItemNotFound(id.to_string()))?
            .record_type;

        if !inner.monitor.is_online() {
            return Ok(SyncOutcome::Skipped(SkipReason::Offline));
        }
        if !inner.gate.is_sync_enabled(record_type) {
            debug!(id, %record_type, "sync disabled for record type");
            return Ok(SyncOutcome::Skipped(SkipReason::Disabled));
        }

        let item = match inner.registry.claim(id, allow_synced)? {
            Claim::Claimed(item) => item,
            Claim::Refused(status) => {
                return Ok(SyncOutcome::Skipped(SkipReason::for_status(status)))
            }
        };

        let claim = ClaimGuard::new(&inner.registry, &item);
        inner.events.publish(SyncEvent::ItemSyncStart { id: id.to_string() });
        debug!(id, version = item.local_version, "item sync started");

        let outcome = match self.reconcile_claimed(&item).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => self.fail(&item, e, max_retries),
        };
        claim.disarm();
        outcome
    }

    async fn reconcile_claimed(&self, item: &SyncItem) -> SyncResult<SyncOutcome> {
        let inner = &self.inner;
        let remote = inner.transport.fetch(item.record_type, &item.id).await?;

        match reconcile(item, remote.as_ref()) {
            Reconciliation::Push => {
                let version = item.local_version;
                let ack = inner
                    .transport
                    .push(item.record_type, &item.id, &item.payload, version)
                    .await?;
                if ack.version != version {
                    warn!(
                        id = %item.id,
                        pushed = version,
                        acked = ack.version,
                        "remote acknowledged a different version"
                    );
                }
                match inner.registry.mark_pushed(&item.id, version)? {
                    Transition::Applied(_) => {
                        debug!(id = %item.id, version, "item pushed");
                        self.completed(&item.id, version);
                        Ok(SyncOutcome::Pushed { version })
                    }
                    Transition::Superseded => Ok(SyncOutcome::Superseded),
                }
            }
            Reconciliation::Pull { payload, version } => {
                match inner.registry.mark_pulled(
                    &item.id,
                    item.local_version,
                    payload.clone(),
                    version,
                )? {
                    Transition::Applied(_) => {
                        if let Err(e) = inner.store.write_record(item.record_type, &item.id, &payload)
                        {
                            warn!(id = %item.id, error = %e, "failed to write pulled record");
                        }
                        debug!(id = %item.id, version, "item pulled");
                        self.completed(&item.id, version);
                        Ok(SyncOutcome::Pulled { version })
                    }
                    Transition::Superseded => Ok(SyncOutcome::Superseded),
                }
            }
            Reconciliation::Conflict(conflict) => {
                match inner
                    .registry
                    .mark_conflict(item.local_version, conflict.clone())?
                {
                    Transition::Applied(_) => {
                        info!(
                            id = %item.id,
                            local_version = conflict.local_version,
                            remote_version = conflict.remote_version,
                            fields = conflict.conflicting_fields.len(),
                            "conflict detected"
                        );
                        inner.events.publish(SyncEvent::Conflict(conflict.clone()));
                        Ok(SyncOutcome::Conflict(conflict))
                    }
                    Transition::Superseded => Ok(SyncOutcome::Superseded),
                }
            }
        }
    }

    fn completed(&self, id: &str, remote_version: u64) {
        self.inner.events.publish(SyncEvent::ItemSyncComplete {
            id: id.to_string(),
            remote_version,
        });
    }

    fn fail(&self, item: &SyncItem, error: SyncError, max_retries: u32) -> SyncResult<SyncOutcome> {
        let message = error.to_string();
        let updated = match self
            .inner
            .registry
            .mark_failed(&item.id, item.local_version, &message)?
        {
            Transition::Applied(updated) => updated,
            Transition::Superseded => return Ok(SyncOutcome::Superseded),
        };

        let retry_count = updated.retry_count;
        let will_retry = error.is_retryable() && retry_count < max_retries;
        self.inner.events.publish(SyncEvent::ItemSyncError {
            id: item.id.clone(),
            message: message.clone(),
            retry_count,
            will_retry,
        });

        if will_retry {
            self.schedule_retry(item.id.clone(), retry_count, max_retries);
        } else {
            warn!(
                id = %item.id,
                retry_count,
                retryable = error.is_retryable(),
                error = %message,
                "item sync failed, not retrying"
            );
        }

        Ok(SyncOutcome::Failed {
            message,
            retry_count,
            will_retry,
        })
    }

    fn schedule_retry(&self, id: String, retry_count: u32, max_retries: u32) {
        let delay = self.inner.config.retry.delay_for_attempt(retry_count);
        debug!(id = %id, retry_count, delay_ms = delay.as_millis() as u64, "retry scheduled");

        let orchestrator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match orchestrator.sync_item(&id, false, max_retries).await {
                Ok(SyncOutcome::Skipped(reason)) => {
                    debug!(id = %id, ?reason, "retry skipped");
                }
                Ok(_) => {}
                Err(e) => debug!(id = %id, error = %e, "retry abandoned"),
            }
        });
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("registry", &self.inner.registry)
            .field("monitor", &self.inner.monitor)
            .field("syncing", &self.is_syncing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryRemote;

    fn orchestrator() -> (SyncOrchestrator, Arc<MemoryRemote>) {
        let remote = Arc::new(MemoryRemote::new());
        let orchestrator = SyncOrchestrator::builder(remote.clone())
            .config(SyncConfig::new().with_batch_delay(Duration::ZERO))
            .build();
        (orchestrator, remote)
    }

    #[tokio::test]
    async fn sync_one_pushes_new_item() {
        let (orchestrator, remote) = orchestrator();
        orchestrator.track(RecordType::Progress, "L1", Value::Integer(10));

        let outcome = orchestrator.sync_one("L1").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { version: 1 });

        let item = orchestrator.registry().get("L1").unwrap();
        assert_eq!(item.status, ItemStatus::Synced);
        assert_eq!(item.remote_version, Some(1));
        assert_eq!(
            remote.get_remote(RecordType::Progress, "L1").unwrap().payload,
            Value::Integer(10)
        );
    }

    #[tokio::test]
    async fn sync_one_unknown_item() {
        let (orchestrator, _) = orchestrator();
        assert!(matches!(
            orchestrator.sync_one("nope").await,
            Err(SyncError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn pull_writes_record_to_store() {
        let remote = Arc::new(MemoryRemote::new());
        let store = Arc::new(MemoryStore::new());
        let orchestrator = SyncOrchestrator::builder(remote.clone())
            .store(store.clone())
            .build();

        orchestrator.track(RecordType::Preference, "theme", Value::from("light"));
        orchestrator.sync_one("theme").await.unwrap();
        remote.put_remote(RecordType::Preference, "theme", Value::from("dark"), 5);

        let outcome = orchestrator
            .sync_all(SyncOptions::forced())
            .await
            .unwrap();
        assert_eq!(outcome.synced, 1);

        let item = orchestrator.registry().get("theme").unwrap();
        assert_eq!(item.payload, Value::from("dark"));
        assert_eq!(item.local_version, 5);
        assert_eq!(
            store.read_record(RecordType::Preference, "theme").unwrap(),
            Some(Value::from("dark"))
        );
    }

    #[tokio::test]
    async fn events_follow_item_lifecycle() {
        let (orchestrator, _) = orchestrator();
        let mut events = orchestrator.subscribe();

        orchestrator.track(RecordType::Achievement, "first", Value::Bool(true));
        orchestrator.sync_one("first").await.unwrap();

        assert!(matches!(events.try_recv().unwrap(), SyncEvent::ItemAdded { .. }));
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::ItemSyncStart {
                id: "first".into()
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::ItemSyncComplete {
                id: "first".into(),
                remote_version: 1
            }
        );
    }

    #[tokio::test]
    async fn reset_announces_cleared_data() {
        let (orchestrator, _) = orchestrator();
        orchestrator.track(RecordType::Progress, "L1", Value::Null);
        let mut events = orchestrator.subscribe();

        orchestrator.reset().unwrap();
        assert_eq!(events.try_recv().unwrap(), SyncEvent::DataCleared);
        assert_eq!(orchestrator.status().total, 0);
    }

    #[test]
    fn pass_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = PassGuard::acquire(&flag).unwrap();
        assert!(PassGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(PassGuard::acquire(&flag).is_some());
    }
}
