//! Aggregate sync status view.

use crate::item::{ItemStatus, SyncItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Computed view of the registry. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Whether the device is online.
    pub online: bool,
    /// Whether a full sync pass is running.
    pub syncing: bool,
    /// Items waiting to be pushed.
    pub pending: usize,
    /// Items awaiting conflict resolution.
    pub conflicts: usize,
    /// Items whose last attempt failed.
    pub errors: usize,
    /// Items in agreement with the remote.
    pub synced: usize,
    /// All tracked items.
    pub total: usize,
    /// Completion time of the last full sync pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Share of synced items, in percent.
    pub progress: f64,
}

impl SyncStatus {
    /// Computes the status view from the tracked items.
    pub fn compute<'a>(
        items: impl IntoIterator<Item = &'a SyncItem>,
        online: bool,
        syncing: bool,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut status = SyncStatus {
            online,
            syncing,
            pending: 0,
            conflicts: 0,
            errors: 0,
            synced: 0,
            total: 0,
            last_sync_at,
            progress: 100.0,
        };

        for item in items {
            status.total += 1;
            match item.status {
                ItemStatus::Pending => status.pending += 1,
                ItemStatus::Conflict => status.conflicts += 1,
                ItemStatus::Error => status.errors += 1,
                ItemStatus::Synced => status.synced += 1,
                ItemStatus::Syncing => {}
            }
        }

        if status.total > 0 {
            status.progress = status.synced as f64 * 100.0 / status.total as f64;
        }
        status
    }

    /// Returns true if nothing is left to push, retry or resolve.
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.conflicts == 0 && self.errors == 0 && !self.syncing
    }
}
