//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A block operation was not aligned to the store's block size.
    #[error("misaligned block I/O: offset {offset}, len {len}, block size {block_size}")]
    Misaligned {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        len: usize,
        /// The store's block size in bytes.
        block_size: u64,
    },

    /// The store has been closed and accepts no more I/O.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates an I/O error of kind `Other` carrying a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::Other, message.into()))
    }
}
