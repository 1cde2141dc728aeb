//! Segment header and trailer encoding.
//!
//! ```text
//! offset 0                                   seg_size - 16        seg_size
//! | header (20) | record region ... | padding | trailer (16) |
//!
//! header:  seq_nr u64 | ver_nr u32 | seg_size u64
//! trailer: seq_nr u64 | rec_nr u32 | reserved u32
//! ```
//!
//! All integers are little-endian. A segment is consistent when its header
//! and trailer carry the same sequence number.

use crate::types::SequenceNumber;
use thiserror::Error;

/// Segment format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Encoded size of a segment header.
pub const HEADER_SIZE: usize = 20;

/// Encoded size of a segment trailer.
pub const TRAILER_SIZE: usize = 16;

/// Bytes of every segment not available to records.
pub const SEGMENT_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// A buffer was too small for an encode or decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("insufficient space: need {needed} bytes, {available} available")]
pub struct InsufficientSpace {
    /// Bytes required.
    pub needed: usize,
    /// Bytes available.
    pub available: usize,
}

impl InsufficientSpace {
    pub(crate) fn check(needed: usize, available: usize) -> Result<(), Self> {
        if available < needed {
            return Err(Self { needed, available });
        }
        Ok(())
    }
}

/// Errors decoding segment metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ends before the structure does.
    #[error(transparent)]
    Truncated(#[from] InsufficientSpace),

    /// The block is zero-filled: no segment was ever written here.
    #[error("zero-filled block carries no segment header")]
    NoData,
}

fn le_u32(src: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&src[..4]);
    u32::from_le_bytes(raw)
}

fn le_u64(src: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&src[..8]);
    u64::from_le_bytes(raw)
}

/// Metadata at the start of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Sequence number of the write that produced the segment.
    pub seq_nr: SequenceNumber,
    /// Format version.
    pub version: u32,
    /// Segment size the repository was written with.
    pub segment_size: u64,
}

impl SegmentHeader {
    /// Creates a header for the current format version.
    #[must_use]
    pub const fn new(seq_nr: SequenceNumber, segment_size: u64) -> Self {
        Self {
            seq_nr,
            version: FORMAT_VERSION,
            segment_size,
        }
    }

    /// Returns the encoded header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.seq_nr.as_u64().to_le_bytes());
        out[8..12].copy_from_slice(&self.version.to_le_bytes());
        out[12..20].copy_from_slice(&self.segment_size.to_le_bytes());
        out
    }

    /// Encodes the header into the start of `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if `dst` is shorter than [`HEADER_SIZE`].
    pub fn encode(&self, dst: &mut [u8]) -> Result<(), InsufficientSpace> {
        InsufficientSpace::check(HEADER_SIZE, dst.len())?;
        dst[..HEADER_SIZE].copy_from_slice(&self.to_bytes());
        Ok(())
    }

    /// Decodes a header from the start of `src`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NoData`] if the header bytes are all zero and
    /// [`DecodeError::Truncated`] if `src` is too short.
    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        InsufficientSpace::check(HEADER_SIZE, src.len())?;
        let raw = &src[..HEADER_SIZE];
        if raw.iter().all(|&b| b == 0) {
            return Err(DecodeError::NoData);
        }
        Ok(Self {
            seq_nr: SequenceNumber::new(le_u64(&raw[0..8])),
            version: le_u32(&raw[8..12]),
            segment_size: le_u64(&raw[12..20]),
        })
    }
}

/// Metadata in the last bytes of every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentTrailer {
    /// Must equal the header's sequence number.
    pub seq_nr: SequenceNumber,
    /// Number of records in the segment.
    pub record_count: u32,
}

impl SegmentTrailer {
    /// Creates a trailer.
    #[must_use]
    pub const fn new(seq_nr: SequenceNumber, record_count: u32) -> Self {
        Self {
            seq_nr,
            record_count,
        }
    }

    /// Returns the encoded trailer. The reserved word is written as zero.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE] {
        let mut out = [0u8; TRAILER_SIZE];
        out[0..8].copy_from_slice(&self.seq_nr.as_u64().to_le_bytes());
        out[8..12].copy_from_slice(&self.record_count.to_le_bytes());
        out
    }

    /// Encodes the trailer into the start of `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if `dst` is shorter than
    /// [`TRAILER_SIZE`].
    pub fn encode(&self, dst: &mut [u8]) -> Result<(), InsufficientSpace> {
        InsufficientSpace::check(TRAILER_SIZE, dst.len())?;
        dst[..TRAILER_SIZE].copy_from_slice(&self.to_bytes());
        Ok(())
    }

    /// Decodes a trailer from the start of `src`. A zero trailer decodes to
    /// sequence number zero; the reserved word is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if `src` is too short.
    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        InsufficientSpace::check(TRAILER_SIZE, src.len())?;
        Ok(Self {
            seq_nr: SequenceNumber::new(le_u64(&src[0..8])),
            record_count: le_u32(&src[8..12]),
        })
    }
}
