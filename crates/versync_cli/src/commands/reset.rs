//! Reset command implementation.

use super::open_registry;
use std::path::Path;
use tracing::info;

/// Runs the reset command.
pub fn run(path: &Path, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(path)?;
    let total = registry.len();
    let conflicts = registry.conflicts().len();

    if !yes {
        println!(
            "Would clear {} item(s) and {} conflict(s) at {:?}",
            total, conflicts, path
        );
        println!("Re-run with --yes to proceed.");
        return Ok(());
    }

    registry.reset()?;
    info!(path = %path.display(), total, conflicts, "registry cleared");
    println!("Cleared {} item(s) and {} conflict(s).", total, conflicts);

    Ok(())
}
