//! Block store trait definition.

use crate::error::{StorageError, StorageResult};
use std::fmt;
use thiserror::Error;

/// A transaction scope wrapped around one asynchronous write.
///
/// Stores that need no transactional bookkeeping never hand one out (see
/// [`BlockStore::begin_transaction`]). When one is opened, it travels with its
/// [`WriteRequest`] and is committed by whoever observes the write finishing.
pub trait WriteTransaction: Send {
    /// Closes the transaction scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope cannot be closed.
    fn commit(self: Box<Self>) -> StorageResult<()>;
}

/// An asynchronous write owned by the store while it is in flight.
///
/// The request is handed back unchanged (buffer included) in the
/// [`WriteOutcome`], or in a [`LaunchError`] if it never started.
pub struct WriteRequest {
    /// Byte offset of the first block.
    pub offset: u64,
    /// The bytes to write; its length must be a whole number of blocks.
    pub data: Vec<u8>,
    /// Transaction scope opened for this write, if any.
    pub tx: Option<Box<dyn WriteTransaction>>,
}

impl WriteRequest {
    /// Creates a request without a transaction scope.
    #[must_use]
    pub fn new(offset: u64, data: Vec<u8>) -> Self {
        Self {
            offset,
            data,
            tx: None,
        }
    }

    /// Attaches a transaction scope.
    #[must_use]
    pub fn with_transaction(mut self, tx: Option<Box<dyn WriteTransaction>>) -> Self {
        self.tx = tx;
        self
    }

    /// Returns the number of bytes to write.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the request carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteRequest")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .field("tx", &self.tx.is_some())
            .finish()
    }
}

/// The result of an asynchronous write, delivered to its callback.
#[derive(Debug)]
pub struct WriteOutcome {
    /// The original request, returned to its owner.
    pub request: WriteRequest,
    /// Whether the bytes reached the store.
    pub result: StorageResult<()>,
}

/// An asynchronous write that could not be started.
///
/// The callback passed to [`BlockStore::submit_write`] is never invoked when
/// this is returned.
#[derive(Debug, Error)]
#[error("write launch failed at offset {}: {}", .request.offset, .error)]
pub struct LaunchError {
    /// Why the write could not start.
    #[source]
    pub error: StorageError,
    /// The request, returned to its owner.
    pub request: WriteRequest,
}

impl LaunchError {
    /// Creates a launch error returning `request` to the caller.
    #[must_use]
    pub fn new(error: StorageError, request: WriteRequest) -> Self {
        Self { error, request }
    }
}

/// Completion callback of an asynchronous write.
pub type WriteCallback = Box<dyn FnOnce(WriteOutcome) + Send + 'static>;

/// A block-addressed storage object.
///
/// Stores are **opaque byte stores** addressed in fixed-size blocks of
/// `1 << block_shift()` bytes. The sink owns every format decision.
///
/// # Invariants
///
/// - Block I/O offsets and lengths are multiples of the block size
/// - `read_at` never fails for reading past the end; it returns a short count
/// - `submit_write` either returns `Ok` and later invokes the callback exactly
///   once, or returns the request in a [`LaunchError`] and never invokes it
/// - The callback may run on any thread, including inline before
///   `submit_write` returns; callers must not hold locks the callback takes
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait BlockStore: Send + Sync {
    /// Returns log2 of the block size.
    fn block_shift(&self) -> u32;

    /// Returns the block size in bytes.
    fn block_size(&self) -> u64 {
        1u64 << self.block_shift()
    }

    /// Reads into `buf` starting at `offset`, returning the number of bytes
    /// read. The count is short (possibly zero) at the end of storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is misaligned or an I/O error occurs.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize>;

    /// Writes `data` at `offset` synchronously.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is misaligned or an I/O error occurs.
    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Starts an asynchronous write.
    ///
    /// # Errors
    ///
    /// Returns the request if the write could not be started.
    fn submit_write(&self, request: WriteRequest, on_complete: WriteCallback)
        -> Result<(), LaunchError>;

    /// Opens a transaction scope sized for a write of `len` bytes.
    ///
    /// Stores without transactional bookkeeping return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope cannot be opened.
    fn begin_transaction(&self, len: usize) -> StorageResult<Option<Box<dyn WriteTransaction>>> {
        let _ = len;
        Ok(None)
    }

    /// Makes every completed write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}

/// Checks that `offset` and `len` are whole blocks of `1 << block_shift` bytes.
///
/// # Errors
///
/// Returns [`StorageError::Misaligned`] otherwise.
pub fn check_alignment(offset: u64, len: usize, block_shift: u32) -> StorageResult<()> {
    let block_size = 1u64 << block_shift;
    let mask = block_size - 1;
    if offset & mask != 0 || (len as u64) & mask != 0 {
        return Err(StorageError::Misaligned {
            offset,
            len,
            block_size,
        });
    }
    Ok(())
}
