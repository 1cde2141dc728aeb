//! A store whose writes complete late, on a thread of their own.
//!
//! [`DelayedStore`] hands every asynchronous write to a completion thread
//! that waits out a fixed delay before writing to the backing
//! [`MemoryStore`] and running the callback. Appenders keep going while
//! earlier segments are still in flight, and completions arrive from a
//! thread no appender controls.

use addb_storage::{
    BlockStore, LaunchError, MemoryStore, StorageError, StorageResult, WriteCallback,
    WriteOutcome, WriteRequest,
};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct DelayedWrite {
    due: Instant,
    request: WriteRequest,
    on_complete: WriteCallback,
}

/// A memory store completing each write `delay` after submission.
pub struct DelayedStore {
    inner: Arc<MemoryStore>,
    delay: Duration,
    completed: Arc<AtomicU64>,
    queue: Option<Sender<DelayedWrite>>,
    worker: Option<JoinHandle<()>>,
}

impl DelayedStore {
    /// Creates an empty, byte-granular store.
    ///
    /// # Panics
    ///
    /// Panics if the completion thread cannot be started.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        let inner = Arc::new(MemoryStore::new());
        let completed = Arc::new(AtomicU64::new(0));
        let (tx, rx) = unbounded();
        let worker = {
            let inner = Arc::clone(&inner);
            let completed = Arc::clone(&completed);
            thread::Builder::new()
                .name("addb-delayed-io".to_string())
                .spawn(move || Self::worker_loop(&rx, &inner, &completed))
                .expect("Failed to start completion thread")
        };
        Self {
            inner,
            delay,
            completed,
            queue: Some(tx),
            worker: Some(worker),
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Returns the number of writes that reached the backing store.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    fn worker_loop(rx: &Receiver<DelayedWrite>, inner: &MemoryStore, completed: &AtomicU64) {
        while let Ok(write) = rx.recv() {
            let DelayedWrite {
                due,
                request,
                on_complete,
            } = write;
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
            let result = inner.write_at(request.offset, &request.data);
            completed.fetch_add(1, Ordering::SeqCst);
            on_complete(WriteOutcome { request, result });
        }
    }
}

impl fmt::Debug for DelayedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedStore")
            .field("delay", &self.delay)
            .field("completed", &self.completed())
            .finish()
    }
}

impl Drop for DelayedStore {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl BlockStore for DelayedStore {
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
        let Some(queue) = &self.queue else {
            return Err(LaunchError::new(StorageError::Closed, request));
        };
        let write = DelayedWrite {
            due: Instant::now() + self.delay,
            request,
            on_complete,
        };
        queue
            .send(write)
            .map_err(|err| LaunchError::new(StorageError::Closed, err.0.request))
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

    #[test]
    fn write_completes_on_another_thread_after_delay() {
        let store = DelayedStore::new(Duration::from_millis(20));
        let (tx, rx) = mpsc::channel();
        let submitted = Instant::now();

        store
            .submit_write(
                WriteRequest::new(0, b"late".to_vec()),
                Box::new(move |outcome: WriteOutcome| {
                    tx.send((outcome.result.is_ok(), thread::current().id())).unwrap();
                }),
            )
            .unwrap();
        assert_eq!(store.size().unwrap(), 0);

        let (ok, completer) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ok);
        assert_ne!(completer, thread::current().id());
        assert!(submitted.elapsed() >= Duration::from_millis(20));
        assert_eq!(store.memory().data(), b"late");
    }

    #[test]
    fn drop_drains_queued_writes() {
        let store = DelayedStore::new(Duration::from_millis(1));
        let (tx, rx) = mpsc::channel();
        for i in 0..4u64 {
            let tx = tx.clone();
            store
                .submit_write(
                    WriteRequest::new(i * 2, vec![i as u8; 2]),
                    Box::new(move |_: WriteOutcome| tx.send(()).unwrap()),
                )
                .unwrap();
        }
        drop(store);
        drop(tx);
        assert_eq!(rx.iter().count(), 4);
    }
}
