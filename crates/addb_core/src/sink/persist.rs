//! Sealing and writing segment buffers.

use super::{Shared, SinkState};
use crate::error::{CoreError, CoreResult};
use crate::segment::{SegmentHeader, SegmentTrailer, HEADER_SIZE};
use crate::types::SequenceNumber;
use addb_storage::{BlockStore, LaunchError, WriteOutcome, WriteRequest};
use parking_lot::MutexGuard;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// A buffer to seal and write.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PersistJob {
    /// Pool slot of the buffer.
    pub(crate) slot: usize,
    /// Repository offset of its segment.
    pub(crate) offset: u64,
    /// Records it holds.
    pub(crate) record_nr: u32,
    /// End of its last record; the rest of the record region is zeroed.
    pub(crate) fill_end: usize,
}

impl Shared {
    /// Stamps the buffer with the next sequence number and launches its
    /// write. The lock is released while the write is launched.
    pub(crate) fn persist(
        self: &Arc<Self>,
        store: &dyn BlockStore,
        guard: &mut MutexGuard<'_, SinkState>,
        job: PersistJob,
    ) {
        let state = &mut **guard;
        let seq_nr = state.seq_nr;
        let is_current = state.pool.current_slot() == job.slot;
        let Some(mut data) = state.pool.slot_mut(job.slot).lend() else {
            warn!("ADDB segment buffer {} already has a write in flight", job.slot);
            return;
        };
        let Some(next_seq) = seq_nr.checked_next() else {
            // a segment stamped with the last sequence number could never be followed
            state.pool.slot_mut(job.slot).restore(data);
            self.stats.record_launch_failure();
            error!(
                "ADDB sequence numbers exhausted at {}, segment at offset {} not written",
                seq_nr, job.offset
            );
            self.idle.notify_all();
            return;
        };

        let segment_size = self.geometry.segment_size();
        let trailer_start = self.geometry.trailer_start();
        data[job.fill_end.max(HEADER_SIZE)..trailer_start].fill(0);
        data[..HEADER_SIZE].copy_from_slice(&SegmentHeader::new(seq_nr, segment_size).to_bytes());
        data[trailer_start..]
            .copy_from_slice(&SegmentTrailer::new(seq_nr, job.record_nr).to_bytes());

        state.persist_time = Instant::now();
        if is_current {
            state.persist_nr = job.record_nr;
        }
        state.seq_nr = next_seq;
        self.stats.record_persist();
        debug!(
            "persisting ADDB segment at offset {} with {} and {} records",
            job.offset, seq_nr, job.record_nr
        );

        let shared = Arc::clone(self);
        let slot = job.slot;
        let offset = job.offset;
        let launched = MutexGuard::unlocked(guard, move || {
            let tx = match store.begin_transaction(data.len()) {
                Ok(tx) => tx,
                Err(error) => return Err(LaunchError::new(error, WriteRequest::new(offset, data))),
            };
            let request = WriteRequest::new(offset, data).with_transaction(tx);
            store.submit_write(
                request,
                Box::new(move |outcome| shared.complete_write(slot, seq_nr, outcome)),
            )
        });

        if let Err(LaunchError { error, request }) = launched {
            self.stats.record_launch_failure();
            error!(
                "failed to launch ADDB segment write at offset {} with {}: {}",
                offset, seq_nr, error
            );
            guard.pool.slot_mut(slot).restore(request.data);
            if let Some(tx) = request.tx {
                if let Err(err) = tx.commit() {
                    warn!("closing ADDB write transaction failed: {}", err);
                }
            }
            self.idle.notify_all();
        }
    }

    /// Completion of a segment write: returns the buffer to the pool.
    fn complete_write(&self, slot: usize, seq_nr: SequenceNumber, outcome: WriteOutcome) {
        let WriteOutcome { request, result } = outcome;
        let mut state = self.state.lock();
        match &result {
            Ok(()) => self.stats.record_write_completed(),
            Err(err) => {
                self.stats.record_write_failure();
                error!(
                    "ADDB segment write at offset {} with {} failed: {}",
                    request.offset, seq_nr, err
                );
            }
        }
        state.pool.slot_mut(slot).restore(request.data);
        if let Some(tx) = request.tx {
            if let Err(err) = tx.commit() {
                warn!("closing ADDB write transaction failed: {}", err);
            }
        }
        drop(state);
        self.idle.notify_all();
    }

    /// Persists the current buffer if it holds records no persist covered
    /// and the flush timeout has passed since the previous persist.
    pub(crate) fn flush_on_timeout(self: &Arc<Self>, store: &dyn BlockStore, now: Instant) -> bool {
        let mut guard = self.state.lock();
        if guard.shut_down
            || guard.pool.current().is_busy()
            || guard.record_nr == guard.persist_nr
            || now.saturating_duration_since(guard.persist_time) <= self.flush_timeout
        {
            return false;
        }
        let job = current_job(&guard);
        self.stats.record_timeout_persist();
        self.persist(store, &mut guard, job);
        true
    }

    /// Persists outstanding records and waits for every write to finish.
    ///
    /// Returns false if the sink was already shut down.
    pub(crate) fn shutdown(self: &Arc<Self>, store: &dyn BlockStore) -> CoreResult<bool> {
        let mut guard = self.state.lock();
        if guard.shut_down {
            return Ok(false);
        }
        guard.shut_down = true;
        let failed_before = self.stats.failed_writes();

        while guard.pool.current().is_busy() {
            self.idle.wait(&mut guard);
        }
        if guard.record_nr != guard.persist_nr {
            let job = current_job(&guard);
            self.persist(store, &mut guard, job);
        }
        while !guard.pool.all_idle() {
            self.idle.wait(&mut guard);
        }
        guard.pool.release();
        drop(guard);

        let failed = self.stats.failed_writes() - failed_before;
        if failed > 0 {
            return Err(CoreError::FlushFailed { failed });
        }
        Ok(true)
    }
}

fn current_job(state: &SinkState) -> PersistJob {
    PersistJob {
        slot: state.pool.current_slot(),
        offset: state.offset,
        record_nr: state.record_nr,
        fill_end: state.cursor,
    }
}
