//! Status command implementation.

use super::open_registry;
use std::path::Path;
use versync_protocol::SyncStatus;

/// Runs the status command.
///
/// The store is inspected offline, so `online` and `syncing` are always false.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(path)?;
    let status = registry.status(false, false);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => print_text(path, &status),
    }

    Ok(())
}

fn print_text(path: &Path, status: &SyncStatus) {
    println!("Sync Registry: {}", path.display());
    println!();
    println!("Items:");
    println!("  Total:     {}", status.total);
    println!("  Pending:   {}", status.pending);
    println!("  Synced:    {}", status.synced);
    println!("  Conflicts: {}", status.conflicts);
    println!("  Errors:    {}", status.errors);
    println!();
    println!("Progress:    {:.1}%", status.progress);
    match status.last_sync_at {
        Some(at) => println!("Last sync:   {}", at.to_rfc3339()),
        None => println!("Last sync:   never"),
    }
}
