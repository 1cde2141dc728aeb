//! Ring of segment buffers.
//!
//! Buffers live in slots that never move, so an in-flight write can name
//! its buffer by slot number while the ring grows around it. The ring order
//! is kept separately; new buffers are linked in right after the current one
//! so they are the next to be filled.

use std::fmt;
use thiserror::Error;

/// Why the pool could not add a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum PoolError {
    #[error("segment buffer pool is at its limit of {max} buffers")]
    Full { max: usize },
    #[error("cannot allocate a {bytes}-byte segment buffer")]
    OutOfMemory { bytes: usize },
}

/// One segment-sized buffer.
///
/// While busy, the memory is lent to the store for an in-flight write and
/// `memory` is `None`; it comes back with the write's completion.
#[derive(Default)]
pub(crate) struct PoolBuffer {
    memory: Option<Vec<u8>>,
    busy: bool,
}

impl PoolBuffer {
    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn memory_mut(&mut self) -> Option<&mut [u8]> {
        if self.busy {
            return None;
        }
        self.memory.as_deref_mut()
    }

    /// Marks the buffer busy ahead of a persist.
    pub(crate) fn reserve(&mut self) {
        self.busy = true;
    }

    /// Hands the memory out for a write, leaving the buffer busy.
    pub(crate) fn lend(&mut self) -> Option<Vec<u8>> {
        self.busy = true;
        self.memory.take()
    }

    /// Takes the memory back and marks the buffer idle.
    pub(crate) fn restore(&mut self, memory: Vec<u8>) {
        self.memory = Some(memory);
        self.busy = false;
    }
}

impl fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuffer")
            .field("busy", &self.busy)
            .field("lent", &self.memory.is_none())
            .finish()
    }
}

/// What [`BufferPool::advance`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// The next buffer in the ring was idle.
    Idle,
    /// The next buffer was busy, so a new one was linked in.
    Grew,
    /// The next buffer was busy and the pool could not grow; the busy buffer
    /// is current anyway.
    Busy(PoolError),
}

#[derive(Debug)]
pub(crate) struct BufferPool {
    slots: Vec<PoolBuffer>,
    ring: Vec<usize>,
    current: usize,
    buffer_len: usize,
    max_buffers: usize,
}

impl BufferPool {
    /// Allocates `min_buffers` zeroed buffers of `buffer_len` bytes.
    pub(crate) fn new(
        buffer_len: usize,
        min_buffers: usize,
        max_buffers: usize,
    ) -> Result<Self, PoolError> {
        let mut pool = Self {
            slots: Vec::with_capacity(max_buffers),
            ring: Vec::with_capacity(max_buffers),
            current: 0,
            buffer_len,
            max_buffers,
        };
        for _ in 0..min_buffers {
            pool.grow()?;
        }
        Ok(pool)
    }

    /// Links a new idle buffer in after the current one and returns its slot.
    pub(crate) fn grow(&mut self) -> Result<usize, PoolError> {
        if self.slots.len() >= self.max_buffers {
            return Err(PoolError::Full {
                max: self.max_buffers,
            });
        }
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(self.buffer_len)
            .map_err(|_| PoolError::OutOfMemory {
                bytes: self.buffer_len,
            })?;
        memory.resize(self.buffer_len, 0);

        let slot = self.slots.len();
        self.slots.push(PoolBuffer {
            memory: Some(memory),
            busy: false,
        });
        if self.ring.is_empty() {
            self.ring.push(slot);
            self.current = 0;
        } else {
            self.ring.insert(self.current + 1, slot);
        }
        Ok(slot)
    }

    /// Makes the next buffer in the ring current, first growing the pool if
    /// that buffer is busy.
    pub(crate) fn advance(&mut self) -> Advance {
        let next = (self.current + 1) % self.ring.len();
        if !self.slots[self.ring[next]].is_busy() {
            self.current = next;
            return Advance::Idle;
        }
        match self.grow() {
            Ok(_) => {
                self.current = (self.current + 1) % self.ring.len();
                Advance::Grew
            }
            Err(err) => {
                self.current = next;
                Advance::Busy(err)
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ring.len()
    }

    pub(crate) fn current_slot(&self) -> usize {
        self.ring[self.current]
    }

    pub(crate) fn current(&self) -> &PoolBuffer {
        &self.slots[self.ring[self.current]]
    }

    pub(crate) fn current_mut(&mut self) -> &mut PoolBuffer {
        let slot = self.ring[self.current];
        &mut self.slots[slot]
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> &mut PoolBuffer {
        &mut self.slots[slot]
    }

    pub(crate) fn busy_count(&self) -> usize {
        self.slots.iter().filter(|b| b.is_busy()).count()
    }

    pub(crate) fn all_idle(&self) -> bool {
        self.busy_count() == 0
    }

    /// Frees the memory of every idle buffer.
    pub(crate) fn release(&mut self) {
        for buffer in self.slots.iter_mut().filter(|b| !b.is_busy()) {
            buffer.memory = None;
        }
    }
}
