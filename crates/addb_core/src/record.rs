//! Record encoding into segment buffers.
//!
//! The sink does not interpret records. A [`Record`] knows its encoded
//! length and writes itself through a [`WriteCursor`] positioned in the
//! current segment's record region. [`FramedRecord`] is the stock encoding:
//! a little-endian `u32` length followed by the payload.

use crate::error::AppendError;
use crate::segment::{DecodeError, InsufficientSpace};

/// A bounded write position over a byte buffer.
#[derive(Debug)]
pub struct WriteCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WriteCursor<'a> {
    /// Creates a cursor at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes written.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of bytes still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Appends `bytes`, or writes nothing if they do not fit.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if fewer than `bytes.len()` bytes remain.
    pub fn put(&mut self, bytes: &[u8]) -> Result<(), InsufficientSpace> {
        InsufficientSpace::check(bytes.len(), self.remaining())?;
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Appends a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if fewer than four bytes remain.
    pub fn put_u32_le(&mut self, value: u32) -> Result<(), InsufficientSpace> {
        self.put(&value.to_le_bytes())
    }
}

/// A bounded read position over a byte buffer.
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    /// Creates a cursor at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes consumed.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Consumes and returns the next `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if fewer than `len` bytes remain.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], InsufficientSpace> {
        InsufficientSpace::check(len, self.remaining())?;
        let buf: &'a [u8] = self.buf;
        let out = &buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Consumes a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if fewer than four bytes remain.
    pub fn take_u32_le(&mut self) -> Result<u32, InsufficientSpace> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

/// A record the sink can store.
///
/// `encode` must write exactly `encoded_len()` bytes; the sink reserves that
/// much space before calling it.
pub trait Record {
    /// Returns the number of bytes `encode` writes.
    fn encoded_len(&self) -> usize;

    /// Writes the record at the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if the cursor has too little room.
    fn encode(&self, cursor: &mut WriteCursor<'_>) -> Result<(), InsufficientSpace>;
}

/// Pre-encoded bytes, stored verbatim.
impl Record for [u8] {
    fn encoded_len(&self) -> usize {
        self.len()
    }

    fn encode(&self, cursor: &mut WriteCursor<'_>) -> Result<(), InsufficientSpace> {
        cursor.put(self)
    }
}

impl Record for Vec<u8> {
    fn encoded_len(&self) -> usize {
        self.len()
    }

    fn encode(&self, cursor: &mut WriteCursor<'_>) -> Result<(), InsufficientSpace> {
        cursor.put(self)
    }
}

/// A length-prefixed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramedRecord<'a> {
    payload: &'a [u8],
}

impl<'a> FramedRecord<'a> {
    /// Bytes of framing before the payload.
    pub const PREFIX_SIZE: usize = 4;

    /// Wraps a payload.
    #[must_use]
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload }
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Decodes the next framed record at the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] if the prefix or payload runs past
    /// the end of the buffer.
    pub fn decode(cursor: &mut ReadCursor<'a>) -> Result<Self, DecodeError> {
        let len = cursor.take_u32_le()? as usize;
        let payload = cursor.take(len)?;
        Ok(Self { payload })
    }
}

impl Record for FramedRecord<'_> {
    fn encoded_len(&self) -> usize {
        Self::PREFIX_SIZE + self.payload.len()
    }

    fn encode(&self, cursor: &mut WriteCursor<'_>) -> Result<(), InsufficientSpace> {
        InsufficientSpace::check(self.encoded_len(), cursor.remaining())?;
        let len = u32::try_from(self.payload.len()).map_err(|_| InsufficientSpace {
            needed: self.payload.len(),
            available: u32::MAX as usize,
        })?;
        cursor.put_u32_le(len)?;
        cursor.put(self.payload)
    }
}

/// A pre-encoded record sequence: a little-endian `u32` record count
/// followed by the encoded records.
///
/// Callers that produce several records at once build one batch and store
/// it with a single [`crate::StobSink::append_sequence`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    count: u32,
    body: Vec<u8>,
}

impl RecordBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `record` at the end of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientSpace`] if the record writes more than it
    /// declared; the batch is left unchanged.
    pub fn push<R: Record + ?Sized>(&mut self, record: &R) -> Result<&mut Self, InsufficientSpace> {
        let start = self.body.len();
        self.body.resize(start + record.encoded_len(), 0);
        let mut cursor = WriteCursor::new(&mut self.body[start..]);
        match record.encode(&mut cursor) {
            Ok(()) => {
                let written = cursor.position();
                self.body.truncate(start + written);
                self.count += 1;
                Ok(self)
            }
            Err(err) => {
                self.body.truncate(start);
                Err(err)
            }
        }
    }

    /// Returns the number of records.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns the encoded length of the records, count excluded.
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the wire form consumed by `append_sequence`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.body.len());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

/// Splits a record sequence into its count and encoded records.
pub(crate) fn split_sequence(bytes: &[u8]) -> Result<(u32, &[u8]), AppendError> {
    let mut cursor = ReadCursor::new(bytes);
    let count = cursor
        .take_u32_le()
        .map_err(|_| AppendError::InvalidBatch { len: bytes.len() })?;
    Ok((count, &bytes[4..]))
}
