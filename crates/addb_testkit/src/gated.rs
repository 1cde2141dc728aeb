//! A store whose write completions are released by the test.
//!
//! [`GatedStore`] accepts asynchronous writes and parks them. Nothing reaches
//! the backing [`MemoryStore`] and no callback runs until the test calls
//! [`GatedStore::release_next`] or [`GatedStore::release_all`]. This makes
//! "every buffer is being written" a state a test can hold for as long as it
//! likes.

use addb_storage::{
    BlockStore, LaunchError, MemoryStore, StorageResult, WriteCallback, WriteOutcome,
    WriteRequest,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

struct Parked {
    request: WriteRequest,
    on_complete: WriteCallback,
}

#[derive(Default)]
struct Gate {
    open: bool,
    parked: VecDeque<Parked>,
    submitted: u64,
}

/// A memory store that holds asynchronous writes until released.
#[derive(Default)]
pub struct GatedStore {
    inner: MemoryStore,
    gate: Mutex<Gate>,
}

impl GatedStore {
    /// Creates an empty, byte-granular store with a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing memory store.
    #[must_use]
    pub fn from_memory(inner: MemoryStore) -> Self {
        Self {
            inner,
            gate: Mutex::new(Gate::default()),
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Returns the number of parked writes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.gate.lock().parked.len()
    }

    /// Returns the number of writes accepted so far.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.gate.lock().submitted
    }

    /// Completes the oldest parked write. Returns false if none was parked.
    pub fn release_next(&self) -> bool {
        let parked = self.gate.lock().parked.pop_front();
        match parked {
            Some(parked) => {
                self.complete(parked);
                true
            }
            None => false,
        }
    }

    /// Completes every parked write in submission order and returns how
    /// many there were.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        while self.release_next() {
            released += 1;
        }
        released
    }

    /// Releases every parked write and lets later writes complete inline.
    pub fn open_gate(&self) {
        self.gate.lock().open = true;
        self.release_all();
    }

    /// Parks later writes again.
    pub fn close_gate(&self) {
        self.gate.lock().open = false;
    }

    /// Polls until `count` writes are parked or `timeout` passes.
    ///
    /// Returns true if the count was reached.
    pub fn wait_for_pending(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() < count {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    fn complete(&self, parked: Parked) {
        let Parked {
            request,
            on_complete,
        } = parked;
        let result = self.inner.write_at(request.offset, &request.data);
        on_complete(WriteOutcome { request, result });
    }
}

impl fmt::Debug for GatedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.gate.lock();
        f.debug_struct("GatedStore")
            .field("open", &gate.open)
            .field("pending", &gate.parked.len())
            .field("submitted", &gate.submitted)
            .finish()
    }
}

impl BlockStore for GatedStore {
    fn block_shift(&self) -> u32 {
        self.inner.block_shift()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
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
        let mut gate = self.gate.lock();
        gate.submitted += 1;
        let parked = Parked {
            request,
            on_complete,
        };
        if gate.open {
            drop(gate);
            self.complete(parked);
        } else {
            gate.parked.push_back(parked);
        }
        Ok(())
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn submit(store: &GatedStore, offset: u64, byte: u8, done: &Arc<AtomicUsize>) {
        let done = Arc::clone(done);
        store
            .submit_write(
                WriteRequest::new(offset, vec![byte; 4]),
                Box::new(move |outcome: WriteOutcome| {
                    assert!(outcome.result.is_ok());
                    done.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    #[test]
    fn writes_wait_for_release() {
        let store = GatedStore::new();
        let done = Arc::new(AtomicUsize::new(0));
        submit(&store, 0, 1, &done);
        submit(&store, 4, 2, &done);

        assert_eq!(store.pending(), 2);
        assert_eq!(store.size().unwrap(), 0);
        assert_eq!(done.load(Ordering::SeqCst), 0);

        assert!(store.release_next());
        assert_eq!(store.memory().data(), vec![1; 4]);
        assert_eq!(store.release_all(), 1);
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert!(!store.release_next());
    }

    #[test]
    fn open_gate_completes_inline() {
        let store = GatedStore::new();
        let done = Arc::new(AtomicUsize::new(0));
        submit(&store, 0, 1, &done);
        store.open_gate();
        assert_eq!(done.load(Ordering::SeqCst), 1);

        submit(&store, 4, 2, &done);
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(store.pending(), 0);
        assert_eq!(store.submitted(), 2);

        store.close_gate();
        submit(&store, 8, 3, &done);
        assert_eq!(store.pending(), 1);
    }

    #[test]
    fn wait_for_pending_times_out() {
        let store = GatedStore::new();
        assert!(store.wait_for_pending(0, Duration::ZERO));
        assert!(!store.wait_for_pending(1, Duration::from_millis(5)));
    }
}
