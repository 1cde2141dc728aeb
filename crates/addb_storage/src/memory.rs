//! In-memory block store for testing.

use crate::error::StorageResult;
use crate::store::{check_alignment, BlockStore, LaunchError, WriteCallback, WriteOutcome, WriteRequest};
use parking_lot::RwLock;

/// An in-memory block store.
///
/// The store grows on demand; writing past the end zero-fills the gap.
/// Asynchronous writes complete inline, on the submitting thread, before
/// [`BlockStore::submit_write`] returns.
///
/// The default block size is one byte, so any offset is aligned. Use
/// [`MemoryStore::with_block_shift`] to exercise block-size constraints.
///
/// # Example
///
/// ```rust
/// use addb_storage::{BlockStore, MemoryStore};
///
/// let store = MemoryStore::with_block_shift(6);
/// store.write_at(64, &[7u8; 64]).unwrap();
/// assert_eq!(store.size().unwrap(), 128);
/// assert!(store.write_at(3, &[0u8; 64]).is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Vec<u8>>,
    block_shift: u32,
}

impl MemoryStore {
    /// Creates a new empty, byte-granular store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty store with blocks of `1 << block_shift` bytes.
    #[must_use]
    pub fn with_block_shift(block_shift: u32) -> Self {
        Self {
            data: RwLock::new(Vec::new()),
            block_shift,
        }
    }

    /// Creates a byte-granular store with pre-existing contents.
    ///
    /// Useful for testing startup against a prepared repository.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
            block_shift: 0,
        }
    }

    /// Returns a copy of the whole store.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Returns a copy of `len` bytes at `offset`, zero-padded past the end.
    #[must_use]
    pub fn snapshot(&self, offset: u64, len: usize) -> Vec<u8> {
        let data = self.data.read();
        let mut out = vec![0u8; len];
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        out[..end - start].copy_from_slice(&data[start..end]);
        out
    }

    fn put(&self, offset: u64, bytes: &[u8]) -> StorageResult<()> {
        check_alignment(offset, bytes.len(), self.block_shift)?;
        if bytes.is_empty() {
            return Ok(());
        }
        let start = usize::try_from(offset)
            .map_err(|_| crate::StorageError::other(format!("offset {offset} out of range")))?;
        let end = start + bytes.len();
        let mut data = self.data.write();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl BlockStore for MemoryStore {
    fn block_shift(&self) -> u32 {
        self.block_shift
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        check_alignment(offset, buf.len(), self.block_shift)?;
        let data = self.data.read();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.put(offset, data)
    }

    fn submit_write(
        &self,
        request: WriteRequest,
        on_complete: WriteCallback,
    ) -> Result<(), LaunchError> {
        if let Err(error) = check_alignment(request.offset, request.len(), self.block_shift) {
            return Err(LaunchError::new(error, request));
        }
        let result = self.put(request.offset, &request.data);
        on_complete(WriteOutcome { request, result });
        Ok(())
    }

    fn sync(&self) -> StorageResult<()> {
        // Nothing to make durable
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use std::sync::mpsc;

    #[test]
    fn memory_new_is_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.size().unwrap(), 0);
        assert_eq!(store.block_size(), 1);
        assert!(store.data().is_empty());
    }

    #[test]
    fn memory_write_past_end_zero_fills_gap() {
        let store = MemoryStore::new();
        store.write_at(4, b"abcd").unwrap();

        assert_eq!(store.size().unwrap(), 8);
        assert_eq!(store.data(), b"\0\0\0\0abcd");
    }

    #[test]
    fn memory_read_is_short_at_end() {
        let store = MemoryStore::with_data(b"hello".to_vec());

        let mut buf = [0u8; 8];
        assert_eq!(store.read_at(2, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"llo");

        assert_eq!(store.read_at(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn memory_block_alignment_enforced() {
        let store = MemoryStore::with_block_shift(4);

        assert!(store.write_at(16, &[1u8; 16]).is_ok());
        assert!(matches!(
            store.write_at(8, &[1u8; 16]),
            Err(StorageError::Misaligned { .. })
        ));

        let mut buf = [0u8; 10];
        assert!(store.read_at(0, &mut buf).is_err());
    }

    #[test]
    fn memory_submit_completes_inline() {
        let store = MemoryStore::new();
        let (tx, rx) = mpsc::channel();

        store
            .submit_write(
                WriteRequest::new(0, b"async".to_vec()),
                Box::new(move |outcome| {
                    tx.send(outcome).unwrap();
                }),
            )
            .unwrap();

        let outcome = rx.try_recv().unwrap();
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.request.data, b"async");
        assert_eq!(store.data(), b"async");
    }

    #[test]
    fn memory_misaligned_submit_returns_request() {
        let store = MemoryStore::with_block_shift(3);

        let err = store
            .submit_write(
                WriteRequest::new(4, vec![9u8; 8]),
                Box::new(|_| panic!("callback must not run")),
            )
            .unwrap_err();

        assert!(matches!(err.error, StorageError::Misaligned { .. }));
        assert_eq!(err.request.data, vec![9u8; 8]);
    }

    #[test]
    fn memory_snapshot_pads_with_zeros() {
        let store = MemoryStore::with_data(vec![1, 2, 3]);
        assert_eq!(store.snapshot(1, 4), vec![2, 3, 0, 0]);
        assert_eq!(store.snapshot(100, 2), vec![0, 0]);
    }

    #[test]
    fn memory_default_transaction_is_none() {
        let store = MemoryStore::new();
        assert!(store.begin_transaction(4096).unwrap().is_none());
        assert!(store.sync().is_ok());
    }
}
