//! Feature gating per record type.

use parking_lot::RwLock;
use std::collections::HashSet;
use versync_protocol::RecordType;

/// Decides whether items of a record type may be synchronized.
///
/// Consulted before every item-level attempt. Disabled types are skipped
/// silently and keep their current status.
pub trait FeatureGate: Send + Sync {
    /// Returns true if sync is enabled for the record type.
    fn is_sync_enabled(&self, record_type: RecordType) -> bool;
}

/// A gate that enables every record type.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysEnabled;

impl FeatureGate for AlwaysEnabled {
    fn is_sync_enabled(&self, _record_type: RecordType) -> bool {
        true
    }
}

/// A gate with a runtime-adjustable set of disabled record types.
#[derive(Debug, Default)]
pub struct StaticGate {
    disabled: RwLock<HashSet<RecordType>>,
}

impl StaticGate {
    /// Creates a gate with every type enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gate with the given types disabled.
    pub fn disabling(types: impl IntoIterator<Item = RecordType>) -> Self {
        Self {
            disabled: RwLock::new(types.into_iter().collect()),
        }
    }

    /// Enables or disables sync for a record type.
    pub fn set_enabled(&self, record_type: RecordType, enabled: bool) {
        let mut disabled = self.disabled.write();
        if enabled {
            disabled.remove(&record_type);
        } else {
            disabled.insert(record_type);
        }
    }
}

impl FeatureGate for StaticGate {
    fn is_sync_enabled(&self, record_type: RecordType) -> bool {
        !self.disabled.read().contains(&record_type)
    }
}

impl<F> FeatureGate for F
where
    F: Fn(RecordType) -> bool + Send + Sync,
{
    fn is_sync_enabled(&self, record_type: RecordType) -> bool {
        self(record_type)
    }
}
