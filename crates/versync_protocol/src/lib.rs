//! # versync protocol
//!
//! Record model and conflict engine for versync.
//!
//! This crate provides:
//! - `Value`, the ordered key-value tree carried as record payload
//! - `SyncItem`, `RecordType` and `ItemStatus` for tracked records
//! - `reconcile`, `diff_fields`, `merge` and `resolve`, the conflict engine
//! - `SyncStatus`, the computed registry view
//! - `RegistrySnapshot`, the persisted registry format
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conflict;
pub mod item;
pub mod snapshot;
pub mod status;
pub mod value;

pub use conflict::{
    diff_fields, merge, reconcile, resolve, ConflictStrategy, Reconciliation, SyncConflict,
    ROOT_PATH,
};
pub use item::{ItemStatus, RecordType, RemoteSnapshot, SyncItem};
pub use snapshot::{RegistrySnapshot, SNAPSHOT_FORMAT_VERSION};
pub use status::SyncStatus;
pub use value::Value;
