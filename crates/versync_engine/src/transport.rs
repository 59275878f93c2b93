//! Transport layer abstraction for reaching the remote authority.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use versync_protocol::{RecordType, RemoteSnapshot, Value};

/// Acknowledgement of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    /// Version the remote now holds for the record.
    pub version: u64,
}

/// A remote transport moves single records to and from the remote authority.
///
/// The endpoint for each call is selected by [`RecordType::endpoint`].
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetches the remote snapshot of a record. `None` means the record does
    /// not exist remotely.
    async fn fetch(&self, record_type: RecordType, id: &str)
        -> SyncResult<Option<RemoteSnapshot>>;

    /// Writes a record to the remote at the given version.
    async fn push(
        &self,
        record_type: RecordType,
        id: &str,
        payload: &Value,
        version: u64,
    ) -> SyncResult<PushAck>;
}

/// An in-memory remote authority for tests and demos.
///
/// Supports failure injection, artificial latency, call counting, pausing
/// and direct writes that simulate edits made on another device.
pub struct MemoryRemote {
    records: Mutex<HashMap<(RecordType, String), RemoteSnapshot>>,
    fail_next: AtomicU32,
    fail_always: AtomicBool,
    failures_retryable: AtomicBool,
    latency: Mutex<Duration>,
    paused: watch::Sender<bool>,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
}

impl MemoryRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            records: Mutex::new(HashMap::new()),
            fail_next: AtomicU32::new(0),
            fail_always: AtomicBool::new(false),
            failures_retryable: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            paused,
            fetches: AtomicUsize::new(0),
            pushes: AtomicUsize::new(0),
        }
    }

    /// Stores a record directly, as another device would.
    pub fn put_remote(&self, record_type: RecordType, id: &str, payload: Value, version: u64) {
        self.records.lock().insert(
            (record_type, id.to_string()),
            RemoteSnapshot::new(payload, version),
        );
    }

    /// Returns the stored snapshot of a record.
    pub fn get_remote(&self, record_type: RecordType, id: &str) -> Option<RemoteSnapshot> {
        self.records.lock().get(&(record_type, id.to_string())).cloned()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes every call fail until turned off.
    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Sets whether injected failures are retryable. Defaults to true.
    pub fn set_failures_retryable(&self, retryable: bool) {
        self.failures_retryable.store(retryable, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Holds every call until [`MemoryRemote::resume`] is called.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Releases held calls.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Returns the number of fetch calls received.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Returns the number of push calls received.
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    async fn before_call(&self) -> SyncResult<()> {
        let mut paused = self.paused.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = paused.wait_for(|held| !*held).await;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let injected = self.fail_always.load(Ordering::SeqCst)
            || self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if injected {
            let message = "injected remote failure";
            return Err(if self.failures_retryable.load(Ordering::SeqCst) {
                SyncError::transport_retryable(message)
            } else {
                SyncError::transport_fatal(message)
            });
        }
        Ok(())
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRemote")
            .field("records", &self.len())
            .field("fetches", &self.fetch_count())
            .field("pushes", &self.push_count())
            .finish()
    }
}

#[async_trait]
impl RemoteTransport for MemoryRemote {
    async fn fetch(
        &self,
        record_type: RecordType,
        id: &str,
    ) -> SyncResult<Option<RemoteSnapshot>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        Ok(self.get_remote(record_type, id))
    }

    async fn push(
        &self,
        record_type: RecordType,
        id: &str,
        payload: &Value,
        version: u64,
    ) -> SyncResult<PushAck> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        self.put_remote(record_type, id, payload.clone(), version);
        Ok(PushAck { version })
    }
}
