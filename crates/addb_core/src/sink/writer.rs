//! Space allocation in the current segment buffer.

use super::persist::PersistJob;
use super::pool::{Advance, PoolError};
use super::{Shared, SinkState};
use crate::error::{AppendError, AppendResult, DropReason};
use crate::segment::{InsufficientSpace, HEADER_SIZE};
use addb_storage::BlockStore;
use parking_lot::MutexGuard;
use std::sync::Arc;
use tracing::{debug, warn};

impl Shared {
    /// Reserves `len` bytes in the current buffer and lets `write` fill
    /// them, accounting `records` records on success.
    ///
    /// `write` receives the rest of the record region and returns the
    /// number of bytes it used.
    pub(crate) fn append_with<F>(
        self: &Arc<Self>,
        store: &dyn BlockStore,
        len: usize,
        records: u32,
        write: F,
    ) -> AppendResult
    where
        F: FnOnce(&mut [u8]) -> Result<usize, InsufficientSpace>,
    {
        let capacity = self.geometry.record_capacity();
        if len > capacity {
            self.stats.record_oversize();
            warn!("rejecting ADDB record of {} bytes, segment capacity is {}", len, capacity);
            return Err(AppendError::TooLarge { len, capacity });
        }

        let mut guard = self.state.lock();
        if guard.pool.current().is_busy() {
            return Err(self.dropped(DropReason::BufferBusy));
        }
        if let Err(reason) = self.locate_space(store, &mut guard, len) {
            return Err(self.dropped(reason));
        }

        let end = self.geometry.trailer_start();
        let state = &mut *guard;
        let start = state.cursor;
        let Some(memory) = state.pool.current_mut().memory_mut() else {
            // a timeout persist of the new buffer ran while the lock was released
            return Err(self.dropped(DropReason::BufferBusy));
        };
        let written = match write(&mut memory[start..end]) {
            Ok(written) => written,
            Err(err) => {
                warn!("ADDB record encoding overran its declared length: {}", err);
                return Err(AppendError::Encode(err));
            }
        };
        state.cursor += written;
        state.record_nr = state.record_nr.saturating_add(records);
        self.stats.record_append(u64::from(records), written as u64);
        Ok(())
    }

    fn dropped(&self, reason: DropReason) -> AppendError {
        match reason {
            DropReason::BufferBusy => self.stats.record_dropped_busy(),
            DropReason::OutOfMemory => self.stats.record_dropped_out_of_memory(),
        }
        debug!("dropping ADDB record: {}", reason);
        AppendError::Dropped(reason)
    }

    /// Moves to fresh segments until `len` bytes fit in the current buffer,
    /// persisting each filled buffer left behind.
    ///
    /// The lock is released while persists launch, so the fit is rechecked
    /// after each one.
    pub(crate) fn locate_space(
        self: &Arc<Self>,
        store: &dyn BlockStore,
        guard: &mut MutexGuard<'_, SinkState>,
        len: usize,
    ) -> Result<(), DropReason> {
        let limit = self.geometry.trailer_start();
        while guard.cursor + len > limit {
            let job = PersistJob {
                slot: guard.pool.current_slot(),
                offset: guard.offset,
                record_nr: guard.record_nr,
                fill_end: guard.cursor,
            };
            let persist_required = guard.record_nr != guard.persist_nr;
            if persist_required {
                guard.pool.current_mut().reserve();
            }

            let growth = self.advance(guard);

            if persist_required {
                self.persist(store, guard, job);
            }
            if guard.pool.current().is_busy() {
                return Err(match growth {
                    Advance::Busy(PoolError::OutOfMemory { .. }) => DropReason::OutOfMemory,
                    _ => DropReason::BufferBusy,
                });
            }
        }
        Ok(())
    }

    /// Makes the next ring buffer current and points it at the next segment.
    fn advance(&self, state: &mut SinkState) -> Advance {
        let growth = state.pool.advance();
        match growth {
            Advance::Idle => {}
            Advance::Grew => {
                self.stats.record_pool_growth();
                debug!("ADDB segment buffer pool grew to {}", state.pool.len());
            }
            Advance::Busy(err) => {
                warn!("no idle ADDB segment buffer: {}", err);
            }
        }
        state.offset = self.geometry.next_offset(state.offset);
        state.record_nr = 0;
        state.persist_nr = 0;
        state.cursor = HEADER_SIZE;
        growth
    }
}
