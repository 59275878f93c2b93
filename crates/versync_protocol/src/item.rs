//! Tracked records and their sync status.

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of record being synchronized.
///
/// The record type only selects the remote endpoint; reconciliation treats
/// every type the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Lesson or course progress.
    Progress,
    /// User preferences.
    Preference,
    /// Unlocked achievements.
    Achievement,
    /// Generated artifacts (projects).
    Project,
    /// Conversational logs.
    Conversation,
}

impl RecordType {
    /// All record types, in a stable order.
    pub const ALL: [RecordType; 5] = [
        RecordType::Progress,
        RecordType::Preference,
        RecordType::Achievement,
        RecordType::Project,
        RecordType::Conversation,
    ];

    /// Returns the remote endpoint path segment for this record type.
    pub fn endpoint(&self) -> &'static str {
        match self {
            RecordType::Progress => "progress",
            RecordType::Preference => "preferences",
            RecordType::Achievement => "achievements",
            RecordType::Project => "projects",
            RecordType::Conversation => "conversations",
        }
    }

    /// Returns the short lowercase name of this record type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Progress => "progress",
            RecordType::Preference => "preference",
            RecordType::Achievement => "achievement",
            RecordType::Project => "project",
            RecordType::Conversation => "conversation",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.endpoint() == s)
            .ok_or_else(|| format!("unknown record type: {s}"))
    }
}

/// Sync status of a tracked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Local changes not yet reconciled.
    Pending,
    /// A reconciliation is in flight.
    Syncing,
    /// Local and remote agree.
    Synced,
    /// Both sides changed independently; awaiting resolution.
    Conflict,
    /// The last attempt failed.
    Error,
}

impl ItemStatus {
    /// Returns true if the item still needs to be pushed or retried.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Error)
    }

    /// Returns the lowercase name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Syncing => "syncing",
            ItemStatus::Synced => "synced",
            ItemStatus::Conflict => "conflict",
            ItemStatus::Error => "error",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "syncing" => Ok(ItemStatus::Syncing),
            "synced" => Ok(ItemStatus::Synced),
            "conflict" => Ok(ItemStatus::Conflict),
            "error" => Ok(ItemStatus::Error),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// A tracked, locally mutable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    /// Stable identifier, unique across the registry.
    pub id: String,
    /// Record type (selects the remote endpoint).
    pub record_type: RecordType,
    /// Application data.
    pub payload: Value,
    /// Incremented on every local mutation.
    pub local_version: u64,
    /// Last version acknowledged by the remote, if ever synced.
    pub remote_version: Option<u64>,
    /// Time of the last local mutation.
    pub last_modified_at: DateTime<Utc>,
    /// Time of the last successful reconciliation.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Current sync status.
    pub status: ItemStatus,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

impl SyncItem {
    /// Creates a freshly tracked item at version 1.
    pub fn new(record_type: RecordType, id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            record_type,
            payload,
            local_version: 1,
            remote_version: None,
            last_modified_at: Utc::now(),
            last_synced_at: None,
            status: ItemStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Applies a local mutation: bumps the version and resets sync state.
    pub fn record_mutation(&mut self, payload: Value) {
        self.local_version += 1;
        self.payload = payload;
        self.status = ItemStatus::Pending;
        self.last_error = None;
        self.retry_count = 0;
        self.last_modified_at = Utc::now();
    }

    /// The remote version used as the common base, with "never synced"
    /// counting as zero.
    pub fn base_version(&self) -> u64 {
        self.remote_version.unwrap_or(0)
    }

    /// Returns true if the item changed locally since its last sync.
    pub fn has_local_changes(&self) -> bool {
        self.local_version > self.base_version()
    }
}

/// The remote authority's view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Remote payload.
    pub payload: Value,
    /// Remote version.
    pub version: u64,
}

impl RemoteSnapshot {
    /// Creates a new snapshot.
    pub fn new(payload: Value, version: u64) -> Self {
        Self { payload, version }
    }
}
