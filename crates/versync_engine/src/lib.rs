//! # versync engine
//!
//! Client-resident sync engine that keeps locally mutated records in
//! agreement with a remote authority.
//!
//! This crate provides:
//! - `SyncRegistry`, the persisted record of tracked items and conflicts
//! - `SyncOrchestrator`, the per-item state machine and full sync passes
//! - `SyncScheduler`, the background loop that reacts to connectivity,
//!   local mutations and a periodic timer
//! - `ConnectivityMonitor`, reachability and foreground tracking
//! - Transport (`RemoteTransport`, `HttpTransport`, `MemoryRemote`) and
//!   storage (`LocalStore`, `FileStore`, `MemoryStore`) abstractions
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use versync_engine::{MemoryRemote, SyncOrchestrator, SyncScheduler};
//! use versync_protocol::{RecordType, Value};
//!
//! let orchestrator = SyncOrchestrator::builder(Arc::new(MemoryRemote::new())).build();
//! let scheduler = SyncScheduler::spawn(orchestrator.clone());
//!
//! orchestrator.track(RecordType::Progress, "lesson-1", Value::from(42));
//! // ...
//! scheduler.shutdown().await;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod events;
mod gate;
mod http;
mod monitor;
mod orchestrator;
mod registry;
mod scheduler;
mod store;
mod transport;

pub use config::{RetryConfig, SyncConfig, SyncOptions};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use gate::{AlwaysEnabled, FeatureGate, StaticGate};
pub use http::{HttpClient, HttpResponse, HttpTransport};
pub use monitor::{ConnectivityEvent, ConnectivityMonitor};
pub use orchestrator::{
    ItemFailure, SkipReason, SyncAllResult, SyncOrchestrator, SyncOrchestratorBuilder, SyncOutcome,
};
pub use registry::{ChangeKind, Claim, ItemChange, SyncRegistry, Transition};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use store::{FileStore, LocalStore, MemoryStore};
pub use transport::{MemoryRemote, PushAck, RemoteTransport};

pub use versync_protocol as protocol;
