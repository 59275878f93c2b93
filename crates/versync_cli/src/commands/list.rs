//! List command implementation.

use super::open_registry;
use serde::Serialize;
use std::path::Path;
use versync_protocol::{ItemStatus, RecordType, SyncItem};

/// One row of the item listing.
#[derive(Debug, Serialize)]
pub struct ItemRow {
    /// Item id.
    pub id: String,
    /// Record type.
    pub record_type: RecordType,
    /// Current status.
    pub status: ItemStatus,
    /// Local version.
    pub local_version: u64,
    /// Last acknowledged remote version.
    pub remote_version: Option<u64>,
    /// Consecutive failures.
    pub retry_count: u32,
    /// Most recent failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<SyncItem> for ItemRow {
    fn from(item: SyncItem) -> Self {
        Self {
            id: item.id,
            record_type: item.record_type,
            status: item.status,
            local_version: item.local_version,
            remote_version: item.remote_version,
            retry_count: item.retry_count,
            last_error: item.last_error,
        }
    }
}

/// Runs the list command.
pub fn run(
    path: &Path,
    status: Option<ItemStatus>,
    record_type: Option<RecordType>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(path)?;
    let rows: Vec<ItemRow> = registry
        .filter(|item| {
            status.map_or(true, |s| item.status == s)
                && record_type.map_or(true, |t| item.record_type == t)
        })
        .into_iter()
        .map(ItemRow::from)
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        _ => {
            if rows.is_empty() {
                println!("No items.");
                return Ok(());
            }
            println!(
                "{:<24} {:<12} {:<9} {:>6} {:>6} {:>6}",
                "ID", "TYPE", "STATUS", "LOCAL", "REMOTE", "RETRY"
            );
            for row in &rows {
                let remote = row
                    .remote_version
                    .map_or_else(|| "-".to_string(), |v| v.to_string());
                println!(
                    "{:<24} {:<12} {:<9} {:>6} {:>6} {:>6}",
                    row.id,
                    row.record_type.as_str(),
                    row.status.as_str(),
                    row.local_version,
                    remote,
                    row.retry_count
                );
                if let Some(error) = &row.last_error {
                    println!("    error: {error}");
                }
            }
            println!();
            println!("{} item(s)", rows.len());
        }
    }

    Ok(())
}
