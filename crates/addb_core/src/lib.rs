//! # ADDB Core
//!
//! Circular segment log engine for ADDB telemetry records.
//!
//! This crate provides:
//! - The on-disk segment format (header, trailer, record region)
//! - A stob sink that packs records into in-memory segment buffers and
//!   persists them asynchronously to a fixed-size circular region of a
//!   block store
//! - Startup location of the newest persisted segment
//! - A repository reader that validates persisted segments
//!
//! ## Example
//!
//! ```rust
//! use addb_core::{FramedRecord, SinkConfig, StobSink};
//! use addb_storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let config = SinkConfig::new().segment_size(4096).stob_size(64 * 4096);
//! let sink = StobSink::configure(store, config).unwrap();
//!
//! sink.append_record(&FramedRecord::new(b"fom-phase-transition")).unwrap();
//! sink.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod record;
mod segment;
mod sink;
mod stats;
mod types;

pub use config::{SinkConfig, DEFAULT_MAX_POOL_BUFFERS, DEFAULT_MIN_POOL_BUFFERS};
pub use error::{AppendError, AppendResult, CoreError, CoreResult, DropReason};
pub use record::{FramedRecord, ReadCursor, Record, RecordBatch, WriteCursor};
pub use segment::{
    locate_resume_point, probe_segment_size, DecodeError, FramedRecords, Geometry,
    InsufficientSpace, Locator, RepositoryReader, RepositoryScan, ResumePoint, SegmentHeader,
    SegmentRead, SegmentTrailer, SegmentView, Segments, FORMAT_VERSION, HEADER_SIZE, SEGMENT_OVERHEAD,
    TRAILER_SIZE,
};
pub use sink::StobSink;
pub use stats::{SinkStats, StatsSnapshot};
pub use types::{SegmentIndex, SequenceNumber};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
