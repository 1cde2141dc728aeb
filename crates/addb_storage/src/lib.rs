//! # ADDB Storage
//!
//! Block storage objects ("stobs") for the ADDB stob sink.
//!
//! A stob is an **opaque, block-addressed byte store**. It knows nothing of
//! segments, headers or records; the sink owns all format interpretation.
//!
//! ## Operations
//!
//! - Synchronous block reads and writes (`read_at`, `write_at`)
//! - Asynchronous writes (`submit_write`) whose completion is delivered to a
//!   callback from the store's own execution context
//! - An optional transaction hook (`begin_transaction`) wrapped around each
//!   asynchronous write
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing; completes writes inline
//! - [`FileStore`] - Persistent; completes writes on a dedicated I/O thread
//!
//! ## Example
//!
//! ```rust
//! use addb_storage::{BlockStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.write_at(0, b"segment").unwrap();
//!
//! let mut buf = [0u8; 7];
//! assert_eq!(store.read_at(0, &mut buf).unwrap(), 7);
//! assert_eq!(&buf, b"segment");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::{FileStore, DEFAULT_FILE_BLOCK_SHIFT};
pub use memory::MemoryStore;
pub use store::{
    check_alignment, BlockStore, LaunchError, WriteCallback, WriteOutcome, WriteRequest,
    WriteTransaction,
};
