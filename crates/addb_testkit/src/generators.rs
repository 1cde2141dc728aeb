//! Property-based test generators using proptest.
//!
//! Provides strategies for generating record payloads and repository
//! shapes that keep the sink's configuration constraints.

use addb_core::{SegmentHeader, SegmentTrailer, SequenceNumber, SEGMENT_OVERHEAD};
use proptest::prelude::*;

/// Strategy for record payloads of up to `max_len` bytes.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for a run of payloads, each of up to `max_len` bytes.
pub fn payloads_strategy(max_len: usize, max_count: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(max_len), 0..=max_count)
}

/// Strategy for valid segment sizes: whole multiples of 64 bytes, from the
/// smallest size that holds a small record up to 4 KiB.
pub fn segment_size_strategy() -> impl Strategy<Value = u64> {
    (1u64..=64).prop_map(|blocks| blocks * 64).prop_filter(
        "segment must hold more than its overhead",
        |size| *size > SEGMENT_OVERHEAD as u64,
    )
}

/// Strategy for a repository shape: a segment count and a number of
/// persisted segments, which may lap the ring several times.
pub fn ring_strategy() -> impl Strategy<Value = (u64, u64)> {
    (1u64..=16).prop_flat_map(|segments| (Just(segments), 0..=segments * 3))
}

/// Strategy for non-zero sequence numbers.
pub fn sequence_strategy() -> impl Strategy<Value = SequenceNumber> {
    (1u64..u64::MAX).prop_map(SequenceNumber::new)
}

/// Strategy for segment headers of the current format.
pub fn header_strategy() -> impl Strategy<Value = SegmentHeader> {
    (sequence_strategy(), segment_size_strategy())
        .prop_map(|(seq_nr, size)| SegmentHeader::new(seq_nr, size))
}

/// Strategy for segment trailers.
pub fn trailer_strategy() -> impl Strategy<Value = SegmentTrailer> {
    (sequence_strategy(), any::<u32>())
        .prop_map(|(seq_nr, records)| SegmentTrailer::new(seq_nr, records))
}
