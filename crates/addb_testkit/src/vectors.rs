//! Segment format test vectors.
//!
//! The vectors pin the on-storage byte layout: little-endian integers, a
//! 20-byte header, a 16-byte trailer with a zero reserved word, and records
//! framed by a `u32` length. They serialize to JSON so other tools reading
//! repositories can check themselves against the same bytes.

use crate::golden::hex_decode;
use addb_core::{FramedRecord, RecordBatch, SegmentHeader, SegmentTrailer, SequenceNumber};
use serde::{Deserialize, Serialize};

/// What a vector encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    /// A segment header.
    Header,
    /// A segment trailer.
    Trailer,
    /// One framed record.
    FramedRecord,
    /// A record sequence: count followed by framed records.
    RecordSequence,
}

/// A format test vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// What the vector encodes.
    pub kind: VectorKind,
    /// Sequence number, for headers and trailers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq_nr: Option<u64>,
    /// Segment size, for headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_size: Option<u64>,
    /// Record count, for trailers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u32>,
    /// Record payloads (hex-encoded), for records and sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payloads_hex: Vec<String>,
    /// Expected encoding (hex-encoded).
    pub expected_hex: String,
}

impl FormatVector {
    /// Encodes the vector's input with the sink's own encoders.
    ///
    /// # Panics
    ///
    /// Panics if a field the kind needs is missing.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let seq_nr = || SequenceNumber::new(self.seq_nr.expect("vector needs seq_nr"));
        let payloads: Vec<Vec<u8>> = self.payloads_hex.iter().map(|p| hex_decode(p)).collect();
        match self.kind {
            VectorKind::Header => {
                SegmentHeader::new(seq_nr(), self.segment_size.expect("vector needs segment_size"))
                    .to_bytes()
                    .to_vec()
            }
            VectorKind::Trailer => {
                SegmentTrailer::new(seq_nr(), self.record_count.expect("vector needs record_count"))
                    .to_bytes()
                    .to_vec()
            }
            VectorKind::FramedRecord | VectorKind::RecordSequence => {
                let mut batch = RecordBatch::new();
                for payload in &payloads {
                    batch
                        .push(&FramedRecord::new(payload))
                        .expect("payload fits");
                }
                let bytes = batch.to_bytes();
                if self.kind == VectorKind::FramedRecord {
                    bytes[4..].to_vec()
                } else {
                    bytes
                }
            }
        }
    }

    /// Returns the expected bytes.
    #[must_use]
    pub fn expected(&self) -> Vec<u8> {
        hex_decode(&self.expected_hex)
    }
}

fn vector(id: &str, description: &str, kind: VectorKind, expected_hex: &str) -> FormatVector {
    FormatVector {
        id: id.into(),
        description: description.into(),
        kind,
        seq_nr: None,
        segment_size: None,
        record_count: None,
        payloads_hex: Vec::new(),
        expected_hex: expected_hex.into(),
    }
}

/// Segment format vectors.
#[must_use]
pub fn segment_format_vectors() -> Vec<FormatVector> {
    vec![
        FormatVector {
            seq_nr: Some(1),
            segment_size: Some(256),
            ..vector(
                "header_first",
                "First header of a 256-byte segment repository",
                VectorKind::Header,
                "0100000000000000 01000000 0001000000000000",
            )
        },
        FormatVector {
            seq_nr: Some(0x0102_0304_0506_0708),
            segment_size: Some(4096),
            ..vector(
                "header_byte_order",
                "Header integers are little-endian",
                VectorKind::Header,
                "0807060504030201 01000000 0010000000000000",
            )
        },
        FormatVector {
            seq_nr: Some(1),
            record_count: Some(5),
            ..vector(
                "trailer_five_records",
                "Trailer of a segment holding five records",
                VectorKind::Trailer,
                "0100000000000000 05000000 00000000",
            )
        },
        FormatVector {
            seq_nr: Some(0x0102),
            record_count: Some(0x10),
            ..vector(
                "trailer_reserved_zero",
                "Trailer reserved word is written as zero",
                VectorKind::Trailer,
                "0201000000000000 10000000 00000000",
            )
        },
        FormatVector {
            payloads_hex: vec!["61646462".into()],
            ..vector(
                "framed_record",
                "Record framed by its u32 length",
                VectorKind::FramedRecord,
                "04000000 61646462",
            )
        },
        FormatVector {
            payloads_hex: vec![String::new()],
            ..vector(
                "framed_record_empty",
                "Empty record keeps its length prefix",
                VectorKind::FramedRecord,
                "00000000",
            )
        },
        FormatVector {
            payloads_hex: vec!["61".into(), "6263".into()],
            ..vector(
                "record_sequence",
                "Sequence count precedes the framed records",
                VectorKind::RecordSequence,
                "02000000 01000000 61 02000000 6263",
            )
        },
        vector(
            "record_sequence_empty",
            "Empty sequence is a zero count",
            VectorKind::RecordSequence,
            "00000000",
        ),
    ]
}

/// Serializes vectors as pretty-printed JSON.
///
/// # Panics
///
/// Panics if serialization fails.
#[must_use]
pub fn vectors_to_json(vectors: &[FormatVector]) -> String {
    serde_json::to_string_pretty(vectors).expect("vectors serialize")
}

/// Parses vectors from JSON.
///
/// # Errors
///
/// Returns an error if the JSON does not describe vectors.
pub fn vectors_from_json(json: &str) -> serde_json::Result<Vec<FormatVector>> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::golden::assert_hex_eq;

    #[test]
    fn encoders_match_vectors() {
        for vector in segment_format_vectors() {
            assert_hex_eq(&vector.id, &vector.expected_hex, &vector.encode());
        }
    }

    #[test]
    fn header_vectors_decode_to_their_fields() {
        for vector in segment_format_vectors()
            .into_iter()
            .filter(|v| v.kind == VectorKind::Header)
        {
            let header = SegmentHeader::decode(&vector.expected()).unwrap();
            assert_eq!(Some(header.seq_nr.as_u64()), vector.seq_nr, "{}", vector.id);
            assert_eq!(Some(header.segment_size), vector.segment_size, "{}", vector.id);
        }
    }

    #[test]
    fn vectors_survive_json() {
        let vectors = segment_format_vectors();
        let json = vectors_to_json(&vectors);
        assert!(json.contains("\"kind\": \"record_sequence\""));
        assert_eq!(vectors_from_json(&json).unwrap(), vectors);
    }
}
