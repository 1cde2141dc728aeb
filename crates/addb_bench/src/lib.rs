//! Benchmark utilities.

use addb_core::{FramedRecord, RecordBatch};

/// Create patterned data of the given size.
pub fn bench_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Build the wire form of a record sequence holding `count` framed records
/// of `payload_size` bytes each.
///
/// # Panics
///
/// Panics if a record encodes past its declared length.
pub fn framed_sequence(count: usize, payload_size: usize) -> Vec<u8> {
    let payload = bench_data(payload_size);
    let mut batch = RecordBatch::new();
    for _ in 0..count {
        batch
            .push(&FramedRecord::new(&payload))
            .expect("framed record fits its declared length");
    }
    batch.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_sequence_layout() {
        let bytes = framed_sequence(3, 10);
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(bytes.len(), 4 + 3 * 14);
    }
}
