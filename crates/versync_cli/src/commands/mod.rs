//! CLI command implementations.

pub mod conflicts;
pub mod demo;
pub mod list;
pub mod reset;
pub mod status;

use std::path::Path;
use std::sync::Arc;
use versync_engine::{FileStore, SyncRegistry};

/// Opens the registry persisted under `path`.
///
/// Fails if no registry has been written there yet.
pub fn open_registry(path: &Path) -> Result<SyncRegistry, Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    if !store.registry_path().exists() {
        return Err(format!("No sync registry found at {:?}", path).into());
    }
    Ok(SyncRegistry::open(Arc::new(store)))
}
