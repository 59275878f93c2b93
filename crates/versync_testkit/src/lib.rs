//! # versync testkit
//!
//! Test utilities for versync.
//!
//! This crate provides:
//! - `TestHarness`, an orchestrator wired to in-memory doubles
//! - `TempStore`, a file-backed store in a temporary directory
//! - Property-based test generators for payload trees using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use versync_testkit::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn pushes_new_item() {
//!     let harness = TestHarness::new();
//!     harness.track(RecordType::Progress, "L1", payload(json!({ "score": 10 })));
//!     harness.sync_one("L1").await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
