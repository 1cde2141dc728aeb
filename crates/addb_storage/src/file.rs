//! File-based block store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{check_alignment, BlockStore, LaunchError, WriteCallback, WriteOutcome, WriteRequest};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Block shift used by [`FileStore::open`] (4 KiB blocks).
pub const DEFAULT_FILE_BLOCK_SHIFT: u32 = 12;

struct IoJob {
    request: WriteRequest,
    on_complete: WriteCallback,
}

/// A file-backed block store.
///
/// Synchronous reads and writes run on the caller's thread. Asynchronous
/// writes are queued to a dedicated I/O thread, which performs them in
/// submission order and invokes each completion callback itself.
///
/// # Durability
///
/// - `sync()` calls `File::sync_all()`
/// - With [`FileStore::set_sync_writes`], every asynchronous write is followed
///   by `File::sync_data()` before its callback runs
///
/// # Shutdown
///
/// Dropping the store closes the queue; the I/O thread finishes every write
/// already queued and is then joined.
///
/// # Example
///
/// ```no_run
/// use addb_storage::{BlockStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("addb.stob")).unwrap();
/// store.write_at(0, &[0u8; 4096]).unwrap();
/// store.sync().unwrap();
/// ```
pub struct FileStore {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    block_shift: u32,
    sync_writes: Arc<AtomicBool>,
    queue: Option<Sender<IoJob>>,
    worker: Option<JoinHandle<()>>,
}

impl FileStore {
    /// Opens or creates a store with 4 KiB blocks.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the I/O thread
    /// cannot be started.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_block_shift(path, DEFAULT_FILE_BLOCK_SHIFT)
    }

    /// Opens or creates a store with blocks of `1 << block_shift` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the I/O thread
    /// cannot be started.
    pub fn open_with_block_shift(path: &Path, block_shift: u32) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file = Arc::new(Mutex::new(file));
        let sync_writes = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        let worker = Self::spawn_worker(rx, Arc::clone(&file), Arc::clone(&sync_writes))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            block_shift,
            sync_writes,
            queue: Some(tx),
            worker: Some(worker),
        })
    }

    /// Opens or creates a store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path, block_shift: u32) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open_with_block_shift(path, block_shift)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sets whether each asynchronous write is synced before completing.
    pub fn set_sync_writes(&self, value: bool) {
        self.sync_writes.store(value, Ordering::Relaxed);
    }

    /// Extends the file to at least `len` bytes with zeros.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be resized.
    pub fn preallocate(&self, len: u64) -> StorageResult<()> {
        let file = self.file.lock();
        if file.metadata()?.len() < len {
            file.set_len(len)?;
        }
        Ok(())
    }

    fn spawn_worker(
        rx: Receiver<IoJob>,
        file: Arc<Mutex<File>>,
        sync_writes: Arc<AtomicBool>,
    ) -> StorageResult<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("addb-stob-io".to_string())
            .spawn(move || Self::worker_loop(&rx, &file, &sync_writes))?;
        Ok(handle)
    }

    fn worker_loop(rx: &Receiver<IoJob>, file: &Mutex<File>, sync_writes: &AtomicBool) {
        while let Ok(job) = rx.recv() {
            let IoJob {
                request,
                on_complete,
            } = job;
            let mut result = write_blocks(file, request.offset, &request.data);
            if result.is_ok() && sync_writes.load(Ordering::Relaxed) {
                result = file.lock().sync_data().map_err(StorageError::from);
            }
            if let Err(err) = &result {
                error!(offset = request.offset, len = request.len(), error = %err, "stob write failed");
            }
            on_complete(WriteOutcome { request, result });
        }
        debug!("stob I/O thread exiting");
    }
}

fn write_blocks(file: &Mutex<File>, offset: u64, data: &[u8]) -> StorageResult<()> {
    let mut file = file.lock();
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    Ok(())
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("block_shift", &self.block_shift)
            .field("sync_writes", &self.sync_writes.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl BlockStore for FileStore {
    fn block_shift(&self) -> u32 {
        self.block_shift
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
        check_alignment(offset, buf.len(), self.block_shift)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        check_alignment(offset, data.len(), self.block_shift)?;
        write_blocks(&self.file, offset, data)
    }

    fn submit_write(
        &self,
        request: WriteRequest,
        on_complete: WriteCallback,
    ) -> Result<(), LaunchError> {
        if let Err(error) = check_alignment(request.offset, request.len(), self.block_shift) {
            return Err(LaunchError::new(error, request));
        }
        let Some(queue) = &self.queue else {
            return Err(LaunchError::new(StorageError::Closed, request));
        };
        queue
            .send(IoJob {
                request,
                on_complete,
            })
            .map_err(|err| LaunchError::new(StorageError::Closed, err.into_inner().request))
    }

    fn sync(&self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            // A completion callback may own the last reference.
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!("stob I/O thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("addb.stob");

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.size().unwrap(), 0);
        assert_eq!(store.block_size(), 4096);
        assert!(path.exists());
    }

    #[test]
    fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("addb.stob");
        let store = FileStore::open_with_block_shift(&path, 9).unwrap();

        store.write_at(512, &[0x5A; 512]).unwrap();
        assert_eq!(store.size().unwrap(), 1024);

        let mut buf = [0u8; 512];
        assert_eq!(store.read_at(512, &mut buf).unwrap(), 512);
        assert!(buf.iter().all(|&b| b == 0x5A));

        assert_eq!(store.read_at(0, &mut buf).unwrap(), 512);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn file_read_past_end_is_short() {
        let dir = tempdir().unwrap();
        let store = FileStore::open_with_block_shift(&dir.path().join("s"), 9).unwrap();

        let mut buf = [0u8; 512];
        assert_eq!(store.read_at(4096, &mut buf).unwrap(), 0);
    }

    #[test]
    fn file_misaligned_write_fails() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("s")).unwrap();

        assert!(matches!(
            store.write_at(100, &[0u8; 4096]),
            Err(StorageError::Misaligned { .. })
        ));
    }

    #[test]
    fn file_submit_completes_on_io_thread() {
        let dir = tempdir().unwrap();
        let store = FileStore::open_with_block_shift(&dir.path().join("s"), 9).unwrap();
        let (tx, rx) = mpsc::channel();

        store
            .submit_write(
                WriteRequest::new(1024, vec![3u8; 512]),
                Box::new(move |outcome| {
                    let name = thread::current().name().map(str::to_string);
                    tx.send((outcome, name)).unwrap();
                }),
            )
            .unwrap();

        let (outcome, name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.request.offset, 1024);
        assert_eq!(name.as_deref(), Some("addb-stob-io"));

        let mut buf = [0u8; 512];
        store.read_at(1024, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 3));
    }

    #[test]
    fn file_drop_drains_queued_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s");
        let (tx, rx) = mpsc::channel();

        {
            let store = FileStore::open_with_block_shift(&path, 9).unwrap();
            store.set_sync_writes(true);
            for i in 0..8u8 {
                let tx = tx.clone();
                store
                    .submit_write(
                        WriteRequest::new(u64::from(i) * 512, vec![i; 512]),
                        Box::new(move |outcome| tx.send(outcome.result.is_ok()).unwrap()),
                    )
                    .unwrap();
            }
        }
        drop(tx);

        let completed: Vec<bool> = rx.iter().collect();
        assert_eq!(completed, vec![true; 8]);

        let reopened = FileStore::open_with_block_shift(&path, 9).unwrap();
        assert_eq!(reopened.size().unwrap(), 8 * 512);
    }

    #[test]
    fn file_preallocate_extends_only() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("s")).unwrap();

        store.preallocate(8192).unwrap();
        assert_eq!(store.size().unwrap(), 8192);
        store.preallocate(4096).unwrap();
        assert_eq!(store.size().unwrap(), 8192);
    }
}
