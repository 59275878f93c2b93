//! Demo command implementation.
//!
//! Drives an orchestrator against an in-memory remote: tracks a few items,
//! pushes them, provokes a conflict by editing both sides, then resolves it.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;
use versync_engine::{
    FileStore, LocalStore, MemoryRemote, MemoryStore, SyncEvent, SyncOptions, SyncOrchestrator,
    SyncOutcome,
};
use versync_protocol::{ConflictStrategy, RecordType, Value};

/// Runs the demo command.
///
/// With a `path`, the registry is persisted there and can be inspected with
/// the other commands afterwards.
pub fn run(
    path: Option<&Path>,
    items: usize,
    strategy: ConflictStrategy,
) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn LocalStore> = match path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(session(store, items.max(1), strategy))
}

async fn session(
    store: Arc<dyn LocalStore>,
    items: usize,
    strategy: ConflictStrategy,
) -> Result<(), Box<dyn std::error::Error>> {
    let remote = Arc::new(MemoryRemote::new());
    let orchestrator = SyncOrchestrator::builder(remote.clone())
        .store(store)
        .build();
    let mut events = orchestrator.subscribe();

    println!("== Tracking {} item(s)", items);
    for n in 1..=items {
        let id = format!("lesson-{n}");
        let payload = Value::from(json!({ "score": n * 10, "completed": false }));
        orchestrator.track(RecordType::Progress, &id, payload);
    }
    drain(&mut events);

    println!();
    println!("== Initial sync");
    let result = orchestrator.sync_all(SyncOptions::default()).await?;
    drain(&mut events);
    println!(
        "synced={} conflicted={} errored={} skipped={}",
        result.synced, result.conflicted, result.errored, result.skipped
    );

    println!();
    println!("== Editing lesson-1 on both sides");
    let remote_version = remote
        .get_remote(RecordType::Progress, "lesson-1")
        .map_or(0, |snapshot| snapshot.version);
    remote.put_remote(
        RecordType::Progress,
        "lesson-1",
        Value::from(json!({ "score": 10, "completed": true, "badge": "gold" })),
        remote_version + 1,
    );
    orchestrator.track(
        RecordType::Progress,
        "lesson-1",
        Value::from(json!({ "score": 95, "completed": false })),
    );
    drain(&mut events);

    let outcome = orchestrator.sync_one("lesson-1").await?;
    drain(&mut events);
    if let SyncOutcome::Conflict(conflict) = &outcome {
        println!("conflicting fields: {}", conflict.conflicting_fields.join(", "));
        println!("  local:  {}", conflict.local_payload);
        println!("  remote: {}", conflict.remote_payload);
    } else {
        debug!(?outcome, "expected a conflict");
    }

    println!();
    println!("== Resolving with {}", strategy);
    let outcome = orchestrator
        .resolve_conflict("lesson-1", strategy, None)
        .await?;
    drain(&mut events);
    if let Some(snapshot) = remote.get_remote(RecordType::Progress, "lesson-1") {
        println!("remote now v{}: {}", snapshot.version, snapshot.payload);
    }
    debug!(?outcome, "resolution synced");

    let status = orchestrator.status();
    println!();
    println!(
        "== Done: {}/{} synced, {} conflict(s), {:.0}% complete",
        status.synced, status.total, status.conflicts, status.progress
    );

    Ok(())
}

fn drain(events: &mut UnboundedReceiver<SyncEvent>) {
    while let Ok(event) = events.try_recv() {
        println!("  {}", describe(&event));
    }
}

fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Online => "online".to_string(),
        SyncEvent::Offline => "offline".to_string(),
        SyncEvent::DataCleared => "data cleared".to_string(),
        SyncEvent::ItemAdded {
            id, local_version, ..
        } => format!("tracked {id} v{local_version}"),
        SyncEvent::ItemSyncStart { id } => format!("syncing {id}"),
        SyncEvent::ItemSyncComplete { id, remote_version } => {
            format!("synced {id} at v{remote_version}")
        }
        SyncEvent::ItemSyncError {
            id,
            message,
            will_retry,
            ..
        } => format!("failed {id}: {message} (retry: {will_retry})"),
        SyncEvent::Conflict(conflict) => format!("conflict on {}", conflict.id),
        SyncEvent::ConflictResolved { id, strategy } => format!("resolved {id} with {strategy}"),
        SyncEvent::SyncStart { candidates } => format!("pass started with {candidates} item(s)"),
        SyncEvent::SyncComplete {
            synced,
            conflicted,
            errored,
            duration,
        } => format!(
            "pass finished in {:?}: {synced} synced, {conflicted} conflicted, {errored} errored",
            duration
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_in_memory() {
        run(None, 2, ConflictStrategy::Merge).unwrap();
    }

    #[test]
    fn demo_persists_to_file_store() {
        let dir = tempfile::tempdir().unwrap();
        run(Some(dir.path()), 2, ConflictStrategy::TakeRemote).unwrap();

        let registry = super::super::open_registry(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.conflicts().is_empty());
    }

    #[test]
    fn describe_names_the_item() {
        let text = describe(&SyncEvent::ItemSyncStart {
            id: "lesson-1".into(),
        });
        assert_eq!(text, "syncing lesson-1");
    }
}
