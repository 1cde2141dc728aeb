//! The stob sink.
//!
//! Records are packed into the current in-memory segment buffer. When a
//! record does not fit, the buffer is sealed with a header and trailer and
//! written asynchronously to its slot in the circular repository while
//! filling continues in the next buffer. A flush timeout persists partially
//! filled segments so telemetry does not sit in memory indefinitely.
//!
//! ## Concurrency
//!
//! One mutex guards all mutable sink state. It is released around every
//! write launch, because stores may complete writes inline and completion
//! callbacks take the same mutex. Completions never perform I/O.

mod persist;
mod pool;
mod writer;

use crate::config::SinkConfig;
use crate::error::{AppendResult, CoreError, CoreResult};
use crate::record::{split_sequence, Record, WriteCursor};
use crate::segment::{Geometry, Locator, HEADER_SIZE};
use crate::stats::SinkStats;
use crate::types::SequenceNumber;
use addb_storage::BlockStore;
use parking_lot::{Condvar, Mutex};
use pool::{BufferPool, PoolError};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Mutable sink state, guarded by [`Shared::state`].
#[derive(Debug)]
pub(crate) struct SinkState {
    /// Sequence number for the next persist.
    seq_nr: SequenceNumber,
    /// Repository offset of the current buffer's segment.
    offset: u64,
    /// Records in the current buffer.
    record_nr: u32,
    /// Records of the current buffer covered by its latest persist.
    persist_nr: u32,
    /// Next free byte of the current buffer.
    cursor: usize,
    persist_time: Instant,
    pool: BufferPool,
    shut_down: bool,
}

/// State reachable from completion callbacks.
///
/// Holds no store reference, so an in-flight write keeps only this alive.
pub(crate) struct Shared {
    state: Mutex<SinkState>,
    idle: Condvar,
    stats: SinkStats,
    geometry: Geometry,
    flush_timeout: Duration,
}

struct SinkInner {
    shared: Arc<Shared>,
    store: Arc<dyn BlockStore>,
    sync_on_shutdown: bool,
}

impl SinkInner {
    fn shutdown(&self) -> CoreResult<()> {
        if !self.shared.shutdown(self.store.as_ref())? {
            return Ok(());
        }
        if self.sync_on_shutdown {
            self.store.sync()?;
        }
        info!("ADDB stob sink shut down");
        Ok(())
    }
}

impl Drop for SinkInner {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!("ADDB stob sink shutdown failed: {}", err);
        }
    }
}

/// A circular segment log over a block store.
///
/// `StobSink` is a cheap, cloneable handle. Every clone appends to the same
/// sink; when the last handle goes away the sink shuts down, persisting any
/// buffered records and waiting for in-flight writes.
///
/// # Appends
///
/// Appends never block on I/O and never panic. Under pressure (every buffer
/// being written and the pool at its limit) they drop the record and say so
/// with [`AppendError::Dropped`](crate::AppendError::Dropped).
///
/// # Example
///
/// ```rust
/// use addb_core::{FramedRecord, SinkConfig, StobSink};
/// use addb_storage::{BlockStore, MemoryStore};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let config = SinkConfig::new().segment_size(512).stob_size(8 * 512);
/// let sink = StobSink::configure(store.clone(), config).unwrap();
///
/// let observer = sink.acquire();
/// observer.append_record(&FramedRecord::new(b"stob-io-latency")).unwrap();
/// observer.release();
///
/// sink.close().unwrap();
/// assert!(store.size().unwrap() >= 512);
/// ```
#[derive(Clone)]
pub struct StobSink {
    inner: Arc<SinkInner>,
}

impl StobSink {
    /// Validates the configuration, locates the newest persisted segment
    /// and allocates the buffer pool.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid configuration or one that
    /// disagrees with the repository, a storage error if the repository's
    /// first header cannot be read, and [`CoreError::OutOfMemory`] if the
    /// initial buffers cannot be allocated.
    pub fn configure(store: Arc<dyn BlockStore>, config: SinkConfig) -> CoreResult<Self> {
        config.validate()?;
        config.validate_block_size(store.block_size())?;
        let geometry = Geometry::new(config.segment_size, config.stob_size)?;

        let resume = Locator::new(store.as_ref(), geometry).locate()?;

        let pool = BufferPool::new(
            geometry.segment_len(),
            config.min_pool_buffers,
            config.max_pool_buffers,
        )
        .map_err(|err| match err {
            PoolError::OutOfMemory { bytes } => CoreError::OutOfMemory {
                requested: bytes.saturating_mul(config.min_pool_buffers),
            },
            PoolError::Full { .. } => CoreError::invalid_config(err.to_string()),
        })?;

        let state = SinkState {
            seq_nr: resume.seq_nr,
            offset: resume.offset,
            record_nr: 0,
            persist_nr: 0,
            cursor: HEADER_SIZE,
            persist_time: Instant::now(),
            pool,
            shut_down: false,
        };
        info!(
            "ADDB stob sink configured: {} segments of {} bytes, next write at offset {} with {}",
            geometry.segment_count(),
            geometry.segment_size(),
            resume.offset,
            resume.seq_nr
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            idle: Condvar::new(),
            stats: SinkStats::new(),
            geometry,
            flush_timeout: config.flush_timeout,
        });
        Ok(Self {
            inner: Arc::new(SinkInner {
                shared,
                store,
                sync_on_shutdown: config.sync_on_shutdown,
            }),
        })
    }

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Dropped`](crate::AppendError::Dropped) if no
    /// segment buffer is available,
    /// [`AppendError::TooLarge`](crate::AppendError::TooLarge) if the record
    /// exceeds a segment's record capacity and
    /// [`AppendError::Encode`](crate::AppendError::Encode) if the record
    /// writes more bytes than it declared.
    pub fn append_record<R: Record + ?Sized>(&self, record: &R) -> AppendResult {
        self.inner.shared.append_with(
            self.inner.store.as_ref(),
            record.encoded_len(),
            1,
            |region| {
                let mut cursor = WriteCursor::new(region);
                record.encode(&mut cursor)?;
                Ok(cursor.position())
            },
        )
    }

    /// Appends a pre-encoded record sequence: a little-endian `u32` record
    /// count followed by the encoded records, copied as one unit.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::InvalidBatch`](crate::AppendError::InvalidBatch)
    /// if `sequence` is shorter than its count, otherwise as
    /// [`StobSink::append_record`].
    pub fn append_sequence(&self, sequence: &[u8]) -> AppendResult {
        let (count, body) = split_sequence(sequence)?;
        self.inner
            .shared
            .append_with(self.inner.store.as_ref(), body.len(), count, |region| {
                let mut cursor = WriteCursor::new(region);
                cursor.put(body)?;
                Ok(body.len())
            })
    }

    /// Persists the current segment if it holds unpersisted records and the
    /// flush timeout has passed since the last persist.
    ///
    /// Returns true if a write was launched. Call periodically.
    pub fn flush_on_timeout(&self) -> bool {
        self.inner
            .shared
            .flush_on_timeout(self.inner.store.as_ref(), Instant::now())
    }

    /// Returns another handle to the same sink.
    #[must_use]
    pub fn acquire(&self) -> Self {
        self.clone()
    }

    /// Gives up this handle. The last release shuts the sink down and logs
    /// any shutdown error; use [`StobSink::close`] to observe it instead.
    pub fn release(self) {
        drop(self);
    }

    /// Gives up this handle and, if it is the last one, shuts the sink down.
    ///
    /// When several handles close concurrently, exactly one of the calls
    /// runs the shutdown and reports its outcome; the others return `Ok`.
    /// A handle given up through [`StobSink::release`] or a plain drop
    /// instead of `close` may end up running the shutdown itself, in which
    /// case errors are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FlushFailed`] if writes issued during shutdown
    /// failed, or a storage error if the final sync fails.
    pub fn close(self) -> CoreResult<()> {
        match Arc::into_inner(self.inner) {
            Some(inner) => inner.shutdown(),
            None => Ok(()),
        }
    }

    /// Returns the number of live handles.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns the sink's counters.
    #[must_use]
    pub fn stats(&self) -> &SinkStats {
        &self.inner.shared.stats
    }

    /// Returns the repository geometry.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.inner.shared.geometry
    }

    /// Returns the sequence number the next persist will use.
    #[must_use]
    pub fn next_sequence(&self) -> SequenceNumber {
        self.inner.shared.state.lock().seq_nr
    }

    /// Returns the repository offset of the segment being filled.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.inner.shared.state.lock().offset
    }

    /// Returns the number of records in the segment being filled.
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.inner.shared.state.lock().record_nr
    }

    /// Returns how many of those records the latest persist covered.
    #[must_use]
    pub fn persisted_count(&self) -> u32 {
        self.inner.shared.state.lock().persist_nr
    }

    /// Returns the number of segment buffers.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.inner.shared.state.lock().pool.len()
    }

    /// Returns the number of buffers with a write in flight.
    #[must_use]
    pub fn busy_buffers(&self) -> usize {
        self.inner.shared.state.lock().pool.busy_count()
    }
}

impl fmt::Debug for StobSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.shared.state.lock();
        f.debug_struct("StobSink")
            .field("geometry", &self.inner.shared.geometry)
            .field("seq_nr", &state.seq_nr)
            .field("offset", &state.offset)
            .field("record_nr", &state.record_nr)
            .field("pool", &state.pool.len())
            .finish_non_exhaustive()
    }
}
