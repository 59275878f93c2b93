//! Local durable store for registry snapshots and pulled records.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use versync_protocol::{RecordType, RegistrySnapshot, Value};

/// Registry snapshot file name.
const REGISTRY_FILE: &str = "registry.json";

/// Temporary file used for atomic snapshot writes.
const REGISTRY_TEMP: &str = "registry.json.tmp";

/// Directory holding records adopted from the remote.
const RECORDS_DIR: &str = "records";

/// Durable storage used by the registry.
///
/// Implementations must be safe to call from several tasks; the registry
/// serializes its own snapshot writes.
pub trait LocalStore: Send + Sync {
    /// Replaces the persisted registry snapshot.
    fn save_snapshot(&self, snapshot: &RegistrySnapshot) -> SyncResult<()>;

    /// Loads the persisted registry snapshot, if any.
    fn load_snapshot(&self) -> SyncResult<Option<RegistrySnapshot>>;

    /// Removes the snapshot and all stored records.
    fn clear(&self) -> SyncResult<()>;

    /// Writes a record adopted from the remote to application storage.
    fn write_record(&self, record_type: RecordType, id: &str, payload: &Value) -> SyncResult<()>;

    /// Reads a record previously written with [`LocalStore::write_record`].
    fn read_record(&self, record_type: RecordType, id: &str) -> SyncResult<Option<Value>>;
}

/// An in-memory store with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<RegistrySnapshot>>,
    records: Mutex<HashMap<(RecordType, String), Value>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    fail_records: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a snapshot.
    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        let store = Self::default();
        *store.snapshot.lock() = Some(snapshot);
        store
    }

    /// Makes snapshot writes fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes snapshot loads fail, as for a corrupted store.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Makes record writes fail.
    pub fn set_fail_records(&self, fail: bool) {
        self.fail_records.store(fail, Ordering::SeqCst);
    }

    /// Returns the currently persisted snapshot.
    pub fn snapshot(&self) -> Option<RegistrySnapshot> {
        self.snapshot.lock().clone()
    }

    /// Returns the number of successful snapshot writes.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl LocalStore for MemoryStore {
    fn save_snapshot(&self, snapshot: &RegistrySnapshot) -> SyncResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SyncError::store("snapshot write failed"));
        }
        *self.snapshot.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_snapshot(&self) -> SyncResult<Option<RegistrySnapshot>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SyncError::store("snapshot unreadable"));
        }
        Ok(self.snapshot.lock().clone())
    }

    fn clear(&self) -> SyncResult<()> {
        *self.snapshot.lock() = None;
        self.records.lock().clear();
        Ok(())
    }

    fn write_record(&self, record_type: RecordType, id: &str, payload: &Value) -> SyncResult<()> {
        if self.fail_records.load(Ordering::SeqCst) {
            return Err(SyncError::store("record write failed"));
        }
        self.records
            .lock()
            .insert((record_type, id.to_string()), payload.clone());
        Ok(())
    }

    fn read_record(&self, record_type: RecordType, id: &str) -> SyncResult<Option<Value>> {
        Ok(self
            .records
            .lock()
            .get(&(record_type, id.to_string()))
            .cloned())
    }
}

/// A directory-backed store.
///
/// Layout:
/// - `registry.json`: the registry snapshot
/// - `records/<endpoint>/<id>.json`: records adopted from the remote
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `path`, creating the directory if needed.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the registry snapshot file.
    pub fn registry_path(&self) -> PathBuf {
        self.path.join(REGISTRY_FILE)
    }

    fn record_path(&self, record_type: RecordType, id: &str) -> PathBuf {
        self.path
            .join(RECORDS_DIR)
            .join(record_type.endpoint())
            .join(format!("{}.json", escape_file_name(id)))
    }

    /// Writes `data` to `target` through a temp file and an atomic rename.
    fn write_atomic(&self, target: &Path, temp: &Path, data: &[u8]) -> SyncResult<()> {
        let _guard = self.write_lock.lock();

        let mut file = File::create(temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(temp, target)?;
        if let Some(parent) = target.parent() {
            sync_directory(parent)?;
        }
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn save_snapshot(&self, snapshot: &RegistrySnapshot) -> SyncResult<()> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(
            &self.registry_path(),
            &self.path.join(REGISTRY_TEMP),
            &data,
        )
    }

    fn load_snapshot(&self) -> SyncResult<Option<RegistrySnapshot>> {
        let data = match read_file(&self.registry_path())? {
            Some(data) if !data.is_empty() => data,
            _ => return Ok(None),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn clear(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.registry_path()) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        match fs::remove_dir_all(self.path.join(RECORDS_DIR)) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        Ok(())
    }

    fn write_record(&self, record_type: RecordType, id: &str, payload: &Value) -> SyncResult<()> {
        let target = self.record_path(record_type, id);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        let temp = target.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(payload)?;
        self.write_atomic(&target, &temp, &data)
    }

    fn read_record(&self, record_type: RecordType, id: &str) -> SyncResult<Option<Value>> {
        match read_file(&self.record_path(record_type, id))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

fn read_file(path: &Path) -> SyncResult<Option<Vec<u8>>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(Some(data))
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> SyncResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> SyncResult<()> {
    Ok(())
}

/// Maps an item id to a portable file name. Bytes outside `[A-Za-z0-9_-]`
/// are written as `%XX`.
fn escape_file_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use versync_protocol::{ItemStatus, SyncItem};

    fn sample_snapshot() -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::empty();
        let mut item = SyncItem::new(RecordType::Progress, "L1", Value::from("done"));
        item.status = ItemStatus::Synced;
        item.remote_version = Some(1);
        snapshot.items.push(item);
        snapshot
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.load_snapshot().unwrap().is_none());

        let snapshot = sample_snapshot();
        store.save_snapshot(&snapshot).unwrap();
        assert!(store.registry_path().exists());
        assert!(!dir.path().join(REGISTRY_TEMP).exists());

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_snapshot().unwrap(), Some(snapshot));
    }

    #[test]
    fn file_store_records_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store
            .write_record(RecordType::Preference, "user/theme", &Value::from("dark"))
            .unwrap();
        assert!(dir
            .path()
            .join("records/preferences/user%2Ftheme.json")
            .exists());
        assert_eq!(
            store
                .read_record(RecordType::Preference, "user/theme")
                .unwrap(),
            Some(Value::from("dark"))
        );

        store.save_snapshot(&sample_snapshot()).unwrap();
        store.clear().unwrap();
        assert!(store.load_snapshot().unwrap().is_none());
        assert!(store
            .read_record(RecordType::Preference, "user/theme")
            .unwrap()
            .is_none());

        // Clearing an empty store is fine.
        store.clear().unwrap();
    }

    #[test]
    fn file_store_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(store.registry_path(), b"{ not json").unwrap();

        assert!(matches!(
            store.load_snapshot(),
            Err(SyncError::Serialization(_))
        ));
    }

    #[test]
    fn memory_store_failure_injection() {
        let store = MemoryStore::new();
        store.save_snapshot(&sample_snapshot()).unwrap();
        assert_eq!(store.save_count(), 1);

        store.set_fail_saves(true);
        assert!(store.save_snapshot(&RegistrySnapshot::empty()).is_err());
        assert_eq!(store.snapshot(), Some(sample_snapshot()));

        store.set_fail_loads(true);
        assert!(store.load_snapshot().is_err());

        store.set_fail_records(true);
        assert!(store
            .write_record(RecordType::Project, "p", &Value::Null)
            .is_err());
    }

    #[test]
    fn escapes_unsafe_ids() {
        assert_eq!(escape_file_name("lesson-1_a"), "lesson-1_a");
        assert_eq!(escape_file_name("../x"), "%2E%2E%2Fx");
    }
}
