//! Concurrent append stress utilities.
//!
//! Several threads append framed records to one sink through their own
//! handles while a ticker thread drives the flush timeout. Each payload
//! carries its writer and a per-writer counter, so tests can check that
//! every stored record is intact and that each writer's records come back
//! in the order they were appended.

use addb_core::{AppendError, FramedRecord, StobSink};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of appending threads.
    pub threads: usize,
    /// Records appended by each thread.
    pub records_per_thread: usize,
    /// Payload length in bytes; at least [`PAYLOAD_TAG_SIZE`].
    pub payload_size: usize,
    /// Interval of the flush-timeout ticker, or `None` for no ticker.
    pub tick: Option<Duration>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            records_per_thread: 1_000,
            payload_size: 32,
            tick: Some(Duration::from_millis(1)),
        }
    }
}

/// Bytes at the start of every stress payload naming its writer and counter.
pub const PAYLOAD_TAG_SIZE: usize = 12;

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Records stored.
    pub appended: u64,
    /// Records dropped under pressure.
    pub dropped: u64,
    /// Records refused for any other reason.
    pub rejected: u64,
    /// Wall time of the run.
    pub duration: Duration,
    /// Appends attempted per second.
    pub ops_per_second: f64,
}

impl StressResult {
    fn new(appended: u64, dropped: u64, rejected: u64, duration: Duration) -> Self {
        let total = appended + dropped + rejected;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            appended,
            dropped,
            rejected,
            duration,
            ops_per_second,
        }
    }

    /// Returns every append attempted.
    #[must_use]
    pub fn attempted(&self) -> u64 {
        self.appended + self.dropped + self.rejected
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Appended: {}", self.appended);
        println!("Dropped: {}", self.dropped);
        println!("Rejected: {}", self.rejected);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} appends/sec", self.ops_per_second);
    }
}

/// Builds the payload of record `counter` of `writer`.
#[must_use]
pub fn stress_payload(writer: u32, counter: u64, size: usize) -> Vec<u8> {
    let mut payload = vec![0xA5u8; size.max(PAYLOAD_TAG_SIZE)];
    payload[..4].copy_from_slice(&writer.to_le_bytes());
    payload[4..PAYLOAD_TAG_SIZE].copy_from_slice(&counter.to_le_bytes());
    payload
}

/// Splits a stress payload into its writer and counter.
#[must_use]
pub fn parse_stress_payload(payload: &[u8]) -> Option<(u32, u64)> {
    let writer = u32::from_le_bytes(payload.get(..4)?.try_into().ok()?);
    let counter = u64::from_le_bytes(payload.get(4..PAYLOAD_TAG_SIZE)?.try_into().ok()?);
    Some((writer, counter))
}

/// Appends from `config.threads` threads at once and tallies the outcomes.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_concurrent_appends(sink: &StobSink, config: &StressConfig) -> StressResult {
    let appended = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicU64::new(0));
    let rejected = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let ticker = config.tick.map(|tick| {
        let sink = sink.acquire();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                sink.flush_on_timeout();
                thread::sleep(tick);
            }
        })
    });

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|writer| {
            let sink = sink.acquire();
            let appended = Arc::clone(&appended);
            let dropped = Arc::clone(&dropped);
            let rejected = Arc::clone(&rejected);
            let records = config.records_per_thread;
            let size = config.payload_size;
            thread::spawn(move || {
                for counter in 0..records {
                    let payload = stress_payload(writer as u32, counter as u64, size);
                    match sink.append_record(&FramedRecord::new(&payload)) {
                        Ok(()) => appended.fetch_add(1, Ordering::Relaxed),
                        Err(AppendError::Dropped(_)) => dropped.fetch_add(1, Ordering::Relaxed),
                        Err(_) => rejected.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Stress writer panicked");
    }
    let duration = start.elapsed();

    done.store(true, Ordering::Relaxed);
    if let Some(ticker) = ticker {
        ticker.join().expect("Flush ticker panicked");
    }

    StressResult::new(
        appended.load(Ordering::Relaxed),
        dropped.load(Ordering::Relaxed),
        rejected.load(Ordering::Relaxed),
        duration,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::small_config;
    use addb_storage::MemoryStore;

    #[test]
    fn payload_tags_parse() {
        let payload = stress_payload(3, 99, 32);
        assert_eq!(payload.len(), 32);
        assert_eq!(parse_stress_payload(&payload), Some((3, 99)));
        assert_eq!(stress_payload(0, 0, 1).len(), PAYLOAD_TAG_SIZE);
        assert_eq!(parse_stress_payload(&[0u8; 5]), None);
    }

    #[test]
    fn small_run_accounts_every_append() {
        let store = Arc::new(MemoryStore::new());
        let sink = StobSink::configure(store, small_config(1024, 64)).unwrap();
        let config = StressConfig {
            threads: 2,
            records_per_thread: 50,
            payload_size: 16,
            tick: None,
        };

        let result = run_concurrent_appends(&sink, &config);
        assert_eq!(result.attempted(), 100);
        assert_eq!(result.appended, sink.stats().records_appended());
        assert_eq!(sink.ref_count(), 1);
    }
}
