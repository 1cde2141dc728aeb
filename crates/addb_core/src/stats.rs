//! Sink statistics.
//!
//! Counters for what the sink stored, dropped and wrote. The sink drops
//! records under pressure, so these counters are the only record of how
//! much telemetry was discarded.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = sink.stats().snapshot();
//! println!("appended: {}", stats.records_appended);
//! println!("dropped: {}", stats.records_dropped());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Sink statistics.
///
/// All counters are atomic and can be read while appends and writes are in
/// progress. Values only increase.
#[derive(Debug, Default)]
pub struct SinkStats {
    // Append counters
    records_appended: AtomicU64,
    bytes_appended: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_out_of_memory: AtomicU64,
    rejected_oversize: AtomicU64,

    // Persist counters
    segments_persisted: AtomicU64,
    timeout_persists: AtomicU64,
    writes_completed: AtomicU64,
    write_failures: AtomicU64,
    launch_failures: AtomicU64,

    // Pool
    pool_growths: AtomicU64,
}

impl SinkStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_append(&self, records: u64, bytes: u64) {
        self.records_appended.fetch_add(records, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_busy(&self) {
        self.dropped_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_out_of_memory(&self) {
        self.dropped_out_of_memory.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_oversize(&self) {
        self.rejected_oversize.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persist(&self) {
        self.segments_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout_persist(&self) {
        self.timeout_persists.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_completed(&self) {
        self.writes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_launch_failure(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pool_growth(&self) {
        self.pool_growths.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of records stored in segment buffers.
    pub fn records_appended(&self) -> u64 {
        self.records_appended.load(Ordering::Relaxed)
    }

    /// Returns the number of records dropped for any reason.
    pub fn records_dropped(&self) -> u64 {
        self.dropped_busy.load(Ordering::Relaxed)
            + self.dropped_out_of_memory.load(Ordering::Relaxed)
    }

    /// Returns the number of segment writes launched.
    pub fn segments_persisted(&self) -> u64 {
        self.segments_persisted.load(Ordering::Relaxed)
    }

    /// Returns the number of segment writes that failed, at launch or on
    /// completion.
    pub fn failed_writes(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed) + self.launch_failures.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_appended: self.records_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            dropped_out_of_memory: self.dropped_out_of_memory.load(Ordering::Relaxed),
            rejected_oversize: self.rejected_oversize.load(Ordering::Relaxed),
            segments_persisted: self.segments_persisted.load(Ordering::Relaxed),
            timeout_persists: self.timeout_persists.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
            pool_growths: self.pool_growths.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of sink statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Records stored in segment buffers.
    pub records_appended: u64,
    /// Encoded bytes stored in segment buffers.
    pub bytes_appended: u64,
    /// Records dropped because no idle buffer was available.
    pub dropped_busy: u64,
    /// Records dropped because the pool could not allocate a buffer.
    pub dropped_out_of_memory: u64,
    /// Records rejected for exceeding segment capacity.
    pub rejected_oversize: u64,
    /// Segment writes launched.
    pub segments_persisted: u64,
    /// Of those, writes launched by the flush timeout.
    pub timeout_persists: u64,
    /// Segment writes that completed successfully.
    pub writes_completed: u64,
    /// Segment writes that completed with an error.
    pub write_failures: u64,
    /// Segment writes the store refused to start.
    pub launch_failures: u64,
    /// Buffers added to the pool beyond the initial allocation.
    pub pool_growths: u64,
}

impl StatsSnapshot {
    /// Returns the total number of dropped records.
    #[must_use]
    pub fn records_dropped(&self) -> u64 {
        self.dropped_busy + self.dropped_out_of_memory
    }

    /// Returns the number of launched writes that have not completed.
    #[must_use]
    pub fn writes_in_flight(&self) -> u64 {
        self.segments_persisted
            .saturating_sub(self.writes_completed + self.write_failures + self.launch_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_start_at_zero() {
        let stats = SinkStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn append_and_drop_counters() {
        let stats = SinkStats::new();
        stats.record_append(3, 120);
        stats.record_append(1, 40);
        stats.record_dropped_busy();
        stats.record_dropped_out_of_memory();
        stats.record_oversize();

        let snap = stats.snapshot();
        assert_eq!(snap.records_appended, 4);
        assert_eq!(snap.bytes_appended, 160);
        assert_eq!(snap.records_dropped(), 2);
        assert_eq!(stats.records_dropped(), 2);
        assert_eq!(snap.rejected_oversize, 1);
    }

    #[test]
    fn in_flight_accounting() {
        let stats = SinkStats::new();
        for _ in 0..4 {
            stats.record_persist();
        }
        stats.record_write_completed();
        stats.record_write_failure();
        stats.record_launch_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.writes_in_flight(), 1);
        assert_eq!(stats.failed_writes(), 2);
    }
}
