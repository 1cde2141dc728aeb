//! Fault injection for crash and failure testing.
//!
//! [`FaultyStore`] wraps a [`MemoryStore`] and fails chosen operations, so
//! tests can drive the sink through the paths a real device takes only on
//! bad days:
//!
//! 1. **Refused launch** - `submit_write` hands the request straight back
//! 2. **Failed completion** - the write starts but reports an error
//! 3. **Torn write** - only a prefix of the segment reaches the store
//! 4. **Unreadable header** - reads at chosen offsets fail
//!
//! Faults are armed with a count and fire on the next matching operations.
//! Writes that do start complete inline, like [`MemoryStore`].
//!
//! ## Usage
//!
//! ```rust
//! use addb_testkit::crash::FaultyStore;
//! use addb_testkit::small_config;
//! use addb_core::{CoreError, StobSink};
//! use std::sync::Arc;
//!
//! let store = Arc::new(FaultyStore::new());
//! store.fail_next_completions(1);
//!
//! let sink = StobSink::configure(store.clone(), small_config(256, 4)).unwrap();
//! sink.append_record(&b"lost"[..]).unwrap();
//! assert!(matches!(sink.close(), Err(CoreError::FlushFailed { failed: 1 })));
//! ```

use addb_storage::{
    BlockStore, LaunchError, MemoryStore, StorageError, StorageResult, WriteCallback,
    WriteOutcome, WriteRequest, WriteTransaction,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Faults {
    launches: usize,
    completions: usize,
    /// Bytes of each torn write that still reach the store.
    tears: Vec<usize>,
    unreadable: HashSet<u64>,
}

/// Transaction scopes opened and committed by a [`FaultyStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionCounts {
    /// Scopes handed out by `begin_transaction`.
    pub opened: u64,
    /// Scopes committed.
    pub committed: u64,
}

impl TransactionCounts {
    /// Returns the number of scopes opened but not yet committed.
    #[must_use]
    pub fn open(&self) -> u64 {
        self.opened - self.committed
    }
}

struct CountingTransaction {
    committed: Arc<AtomicU64>,
}

impl WriteTransaction for CountingTransaction {
    fn commit(self: Box<Self>) -> StorageResult<()> {
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A memory store with injectable faults.
#[derive(Debug)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Mutex<Faults>,
    transactional: bool,
    opened: AtomicU64,
    committed: Arc<AtomicU64>,
}

impl Default for FaultyStore {
    fn default() -> Self {
        Self::from_memory(MemoryStore::new())
    }
}

impl FaultyStore {
    /// Creates an empty, byte-granular store with no faults armed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing memory store.
    #[must_use]
    pub fn from_memory(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            transactional: false,
            opened: AtomicU64::new(0),
            committed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes the store open a counted transaction scope for every
    /// asynchronous write.
    #[must_use]
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Refuses to launch the next `count` asynchronous writes.
    pub fn fail_next_launches(&self, count: usize) {
        self.faults.lock().launches += count;
    }

    /// Fails the next `count` asynchronous writes on completion, without
    /// writing any of their bytes.
    pub fn fail_next_completions(&self, count: usize) {
        self.faults.lock().completions += count;
    }

    /// Tears the next asynchronous write: only its first `keep` bytes reach
    /// the store and the write completes with an error.
    pub fn tear_next_write(&self, keep: usize) {
        self.faults.lock().tears.push(keep);
    }

    /// Fails every read starting at `offset`.
    pub fn fail_reads_at(&self, offset: u64) {
        self.faults.lock().unreadable.insert(offset);
    }

    /// Clears every armed fault.
    pub fn heal(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Returns the transaction scopes seen so far.
    #[must_use]
    pub fn transactions(&self) -> TransactionCounts {
        TransactionCounts {
            opened: self.opened.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
        }
    }
}

enum Fault {
    Launch,
    Completion,
    Tear(usize),
}

impl FaultyStore {
    fn take_fault(&self) -> Option<Fault> {
        let mut faults = self.faults.lock();
        if faults.launches > 0 {
            faults.launches -= 1;
            return Some(Fault::Launch);
        }
        if faults.completions > 0 {
            faults.completions -= 1;
            return Some(Fault::Completion);
        }
        if !faults.tears.is_empty() {
            return Some(Fault::Tear(faults.tears.remove(0)));
        }
        None
    }
}

impl BlockStore for FaultyStore {
    fn block_shift(&self) -> u32 {
        self.inner.block_shift()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        if self.faults.lock().unreadable.contains(&offset) {
            return Err(StorageError::other(format!(
                "injected read failure at offset {offset}"
            )));
        }
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.inner.write_at(offset, data)
    }

    fn submit_write(
        &self,
        request: WriteRequest,
        on_complete: WriteCallback,
    ) -> Result<(), LaunchError> {
        let result = match self.take_fault() {
            Some(Fault::Launch) => {
                return Err(LaunchError::new(
                    StorageError::other("injected launch failure"),
                    request,
                ));
            }
            Some(Fault::Completion) => Err(StorageError::other("injected write failure")),
            Some(Fault::Tear(keep)) => {
                let keep = keep.min(request.data.len());
                self.inner
                    .write_at(request.offset, &request.data[..keep])
                    .and(Err(StorageError::other("injected torn write")))
            }
            None => self.inner.write_at(request.offset, &request.data),
        };
        on_complete(WriteOutcome { request, result });
        Ok(())
    }

    fn begin_transaction(&self, _len: usize) -> StorageResult<Option<Box<dyn WriteTransaction>>> {
        if !self.transactional {
            return Ok(None);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Box::new(CountingTransaction {
            committed: Arc::clone(&self.committed),
        })))
    }

    fn sync(&self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn submit(store: &FaultyStore, offset: u64, data: Vec<u8>) -> StorageResult<()> {
        let (tx, rx) = mpsc::channel();
        store
            .submit_write(
                WriteRequest::new(offset, data),
                Box::new(move |outcome: WriteOutcome| {
                    tx.send(outcome.result).unwrap();
                }),
            )
            .map_err(|err| err.error)?;
        rx.recv().unwrap()
    }

    #[test]
    fn launch_failure_returns_request() {
        let store = FaultyStore::new();
        store.fail_next_launches(1);

        let err = store
            .submit_write(
                WriteRequest::new(0, vec![1; 8]),
                Box::new(|_: WriteOutcome| panic!("called")),
            )
            .unwrap_err();
        assert_eq!(err.request.data, vec![1; 8]);

        assert!(submit(&store, 0, vec![2; 8]).is_ok());
        assert_eq!(store.memory().data(), vec![2; 8]);
    }

    #[test]
    fn failed_completion_writes_nothing() {
        let store = FaultyStore::new();
        store.fail_next_completions(1);
        assert!(submit(&store, 0, vec![3; 8]).is_err());
        assert_eq!(store.size().unwrap(), 0);
    }

    #[test]
    fn torn_write_keeps_prefix() {
        let store = FaultyStore::from_memory(MemoryStore::with_data(vec![0; 16]));
        store.tear_next_write(4);
        assert!(submit(&store, 0, vec![9; 16]).is_err());
        assert_eq!(store.memory().snapshot(0, 8), vec![9, 9, 9, 9, 0, 0, 0, 0]);
    }

    #[test]
    fn unreadable_offset_fails_reads() {
        let store = FaultyStore::from_memory(MemoryStore::with_data(vec![5; 64]));
        store.fail_reads_at(32);

        let mut buf = [0u8; 8];
        assert!(store.read_at(32, &mut buf).is_err());
        assert_eq!(store.read_at(0, &mut buf).unwrap(), 8);

        store.heal();
        assert_eq!(store.read_at(32, &mut buf).unwrap(), 8);
    }

    #[test]
    fn transactions_are_counted() {
        let store = FaultyStore::new().transactional();
        let tx = store.begin_transaction(8).unwrap().unwrap();
        assert_eq!(store.transactions().open(), 1);
        tx.commit().unwrap();
        assert_eq!(
            store.transactions(),
            TransactionCounts {
                opened: 1,
                committed: 1
            }
        );
        assert!(FaultyStore::new().begin_transaction(8).unwrap().is_none());
    }
}
