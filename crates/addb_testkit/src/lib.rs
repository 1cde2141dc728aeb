//! # ADDB Testkit
//!
//! Test utilities for the ADDB stob sink.
//!
//! This crate provides:
//! - Fault-injecting stores for failed launches, failed completions,
//!   torn writes and unreadable headers
//! - A gated store that holds write completions until the test releases them
//! - A delayed store that completes writes late, from its own thread
//! - Repository fixtures that lay out segments directly
//! - Property-based test generators using proptest
//! - Golden byte helpers and segment format vectors
//! - Concurrent append stress utilities
//!
//! ## Usage
//!
//! ```rust
//! use addb_testkit::prelude::*;
//! use addb_core::{FramedRecord, StobSink};
//! use std::sync::Arc;
//!
//! let store = Arc::new(GatedStore::new());
//! let sink = StobSink::configure(store.clone(), small_config(256, 4)).unwrap();
//! sink.append_record(&FramedRecord::new(b"held")).unwrap();
//!
//! store.open_gate();
//! sink.close().unwrap();
//! assert_eq!(store.pending(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod delayed;
pub mod fixtures;
pub mod gated;
pub mod generators;
pub mod golden;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::delayed::*;
    pub use crate::fixtures::*;
    pub use crate::gated::*;
    pub use crate::generators::*;
    pub use crate::golden::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
}

pub use crash::{FaultyStore, TransactionCounts};
pub use delayed::DelayedStore;
pub use fixtures::*;
pub use gated::GatedStore;
pub use golden::{assert_hex_eq, hex_decode, hex_encode};
pub use stress::{run_concurrent_appends, StressConfig, StressResult};
