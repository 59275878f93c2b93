//! Conflicts command implementation.

use super::open_registry;
use std::path::Path;

/// Runs the conflicts command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(path)?;
    let conflicts = registry.conflicts();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&conflicts)?),
        _ => {
            if conflicts.is_empty() {
                println!("No open conflicts.");
                return Ok(());
            }
            for conflict in &conflicts {
                println!(
                    "{} ({}): local v{} vs remote v{}",
                    conflict.id,
                    conflict.record_type.as_str(),
                    conflict.local_version,
                    conflict.remote_version
                );
                println!("  detected: {}", conflict.detected_at.to_rfc3339());
                if conflict.conflicting_fields.is_empty() {
                    println!("  fields:   (payloads identical)");
                } else {
                    println!("  fields:   {}", conflict.conflicting_fields.join(", "));
                }
                println!("  local:    {}", conflict.local_payload);
                println!("  remote:   {}", conflict.remote_payload);
            }
        }
    }

    Ok(())
}
