//! Test fixtures and engine helpers.
//!
//! Provides an orchestrator wired to in-memory doubles, plus helpers for
//! file-backed stores and JSON payloads.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use versync_engine::{
    FeatureGate, FileStore, MemoryRemote, MemoryStore, RetryConfig, SyncConfig, SyncOrchestrator,
};
use versync_protocol::Value;

/// Configuration tuned for tests: no pause between batches, default retry
/// schedule (1 s doubling) so paused-clock tests stay readable.
pub fn test_config() -> SyncConfig {
    SyncConfig::new()
        .with_batch_delay(Duration::ZERO)
        .with_retry(RetryConfig::default())
}

/// Builds a payload from a JSON literal.
pub fn payload(json: serde_json::Value) -> Value {
    Value::from(json)
}

/// An orchestrator wired to an in-memory remote and store.
pub struct TestHarness {
    /// The orchestrator under test.
    pub orchestrator: SyncOrchestrator,
    /// The remote authority.
    pub remote: Arc<MemoryRemote>,
    /// The local durable store.
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    /// Creates an online harness with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates an online harness with the given configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::build(config, true, None)
    }

    /// Creates a harness that starts offline.
    pub fn offline() -> Self {
        Self::build(test_config(), false, None)
    }

    /// Creates a harness with a feature gate.
    pub fn with_gate(gate: Arc<dyn FeatureGate>) -> Self {
        Self::build(test_config(), true, Some(gate))
    }

    fn build(config: SyncConfig, online: bool, gate: Option<Arc<dyn FeatureGate>>) -> Self {
        let remote = Arc::new(MemoryRemote::new());
        let store = Arc::new(MemoryStore::new());
        let mut builder = SyncOrchestrator::builder(remote.clone())
            .store(store.clone())
            .config(config)
            .online(online);
        if let Some(gate) = gate {
            builder = builder.gate(gate);
        }

        Self {
            orchestrator: builder.build(),
            remote,
            store,
        }
    }

    /// Rebuilds the orchestrator over the same store and remote, as after an
    /// application restart.
    pub fn restart(&self) -> SyncOrchestrator {
        SyncOrchestrator::builder(self.remote.clone())
            .store(self.store.clone())
            .config(self.orchestrator.config().clone())
            .build()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestHarness {
    type Target = SyncOrchestrator;

    fn deref(&self) -> &Self::Target {
        &self.orchestrator
    }
}

/// A file-backed store in a temporary directory.
pub struct TempStore {
    /// The store.
    pub store: Arc<FileStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    pub dir: TempDir,
}

impl TempStore {
    /// Creates a store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(dir.path()).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Opens a second store over the same directory.
    pub fn reopen(&self) -> Arc<FileStore> {
        Arc::new(FileStore::open(self.dir.path()).expect("Failed to reopen file store"))
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleeps on the tokio clock. Under a paused clock this advances time
/// deterministically and lets spawned tasks run.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use versync_protocol::RecordType;

    #[test]
    fn harness_shares_store() {
        let harness = TestHarness::new();
        harness.track(RecordType::Progress, "L1", payload(serde_json::json!({ "score": 1 })));
        assert_eq!(harness.store.save_count(), 1);

        let restarted = harness.restart();
        assert!(restarted.registry().get("L1").is_some());
    }

    #[test]
    fn offline_harness() {
        let harness = TestHarness::offline();
        assert!(!harness.is_online());
    }

    #[test]
    fn temp_store_reopens_same_directory() {
        let temp = TempStore::new();
        assert_eq!(temp.reopen().path(), temp.store.path());
    }
}
