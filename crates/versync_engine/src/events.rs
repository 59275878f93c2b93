//! Engine events for UI and diagnostics.
//!
//! Events are delivered over unbounded tokio channels. Nothing inside the
//! engine depends on them being consumed; subscribers whose receiver has been
//! dropped are pruned on the next publish.

use parking_lot::RwLock;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use versync_protocol::{ConflictStrategy, RecordType, SyncConflict};

/// An observable engine event.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The device came online.
    Online,
    /// The device went offline.
    Offline,
    /// An item was tracked or mutated locally.
    ItemAdded {
        /// Item id.
        id: String,
        /// Record type of the item.
        record_type: RecordType,
        /// Local version after the mutation.
        local_version: u64,
    },
    /// Reconciliation of an item started.
    ItemSyncStart {
        /// Item id.
        id: String,
    },
    /// An item reached agreement with the remote.
    ItemSyncComplete {
        /// Item id.
        id: String,
        /// Remote version acknowledged or adopted.
        remote_version: u64,
    },
    /// Reconciliation of an item failed.
    ItemSyncError {
        /// Item id.
        id: String,
        /// Failure message.
        message: String,
        /// Consecutive failures so far.
        retry_count: u32,
        /// Whether another attempt is scheduled.
        will_retry: bool,
    },
    /// A conflict was detected.
    Conflict(SyncConflict),
    /// A conflict was resolved.
    ConflictResolved {
        /// Item id.
        id: String,
        /// Strategy that was applied.
        strategy: ConflictStrategy,
    },
    /// A full pass started.
    SyncStart {
        /// Number of candidate items.
        candidates: usize,
    },
    /// A full pass finished.
    SyncComplete {
        /// Items that reached `Synced`.
        synced: usize,
        /// Items that entered `Conflict`.
        conflicted: usize,
        /// Items that failed.
        errored: usize,
        /// Wall time of the pass.
        duration: Duration,
    },
    /// All tracked state was cleared.
    DataCleared,
}

impl SyncEvent {
    /// Returns the id of the item the event concerns, if any.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            SyncEvent::ItemAdded { id, .. }
            | SyncEvent::ItemSyncStart { id }
            | SyncEvent::ItemSyncComplete { id, .. }
            | SyncEvent::ItemSyncError { id, .. }
            | SyncEvent::ConflictResolved { id, .. } => Some(id),
            SyncEvent::Conflict(conflict) => Some(&conflict.id),
            _ => None,
        }
    }
}

/// Distributes events to every live subscriber, in publish order.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<UnboundedSender<SyncEvent>>>,
}

impl EventBus {
    /// Creates an event bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes an event to all subscribers, dropping closed ones.
    pub fn publish(&self, event: SyncEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
