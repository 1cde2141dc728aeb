//! Repository reader.
//!
//! Reads persisted segments back and classifies each one. A segment whose
//! header and trailer sequence numbers differ was torn by a crash or caught
//! mid-overwrite; its records are not trusted.

use super::format::{DecodeError, SegmentHeader, SegmentTrailer, FORMAT_VERSION, HEADER_SIZE, TRAILER_SIZE};
use super::geometry::Geometry;
use crate::error::{CoreError, CoreResult};
use crate::record::{FramedRecord, ReadCursor};
use crate::types::{SegmentIndex, SequenceNumber};
use addb_storage::BlockStore;

/// A consistent persisted segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentView {
    index: SegmentIndex,
    header: SegmentHeader,
    trailer: SegmentTrailer,
    data: Vec<u8>,
}

impl SegmentView {
    /// Returns the segment's position in the repository.
    #[must_use]
    pub fn index(&self) -> SegmentIndex {
        self.index
    }

    /// Returns the decoded header.
    #[must_use]
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    /// Returns the decoded trailer.
    #[must_use]
    pub fn trailer(&self) -> &SegmentTrailer {
        &self.trailer
    }

    /// Returns the sequence number of the write that produced the segment.
    #[must_use]
    pub fn seq_nr(&self) -> SequenceNumber {
        self.header.seq_nr
    }

    /// Returns the number of records the trailer declares.
    #[must_use]
    pub fn record_count(&self) -> u32 {
        self.trailer.record_count
    }

    /// Returns the bytes between header and trailer.
    #[must_use]
    pub fn record_region(&self) -> &[u8] {
        &self.data[HEADER_SIZE..self.data.len() - TRAILER_SIZE]
    }

    /// Iterates the segment's records as length-prefixed frames.
    #[must_use]
    pub fn framed_records(&self) -> FramedRecords<'_> {
        FramedRecords {
            cursor: ReadCursor::new(self.record_region()),
            remaining: self.trailer.record_count,
        }
    }
}

/// Iterator over the framed records of a segment.
#[derive(Debug, Clone)]
pub struct FramedRecords<'a> {
    cursor: ReadCursor<'a>,
    remaining: u32,
}

impl<'a> Iterator for FramedRecords<'a> {
    type Item = Result<&'a [u8], DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match FramedRecord::decode(&mut self.cursor) {
            Ok(record) => Some(Ok(record.payload())),
            Err(err) => {
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

/// Classification of one segment slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentRead {
    /// Never written, or beyond the end of the store.
    Empty,
    /// Header and trailer disagree.
    Torn {
        /// The header as read.
        header: SegmentHeader,
        /// The trailer as read.
        trailer: SegmentTrailer,
    },
    /// The header is not one this repository could have written.
    Malformed {
        /// What is wrong with it.
        reason: String,
    },
    /// A consistent segment.
    Valid(SegmentView),
}

/// Summary of a whole-repository scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryScan {
    /// Consistent segments.
    pub valid: u64,
    /// Torn segments.
    pub torn: u64,
    /// Segments with malformed headers.
    pub malformed: u64,
    /// Empty slots.
    pub empty: u64,
    /// Records declared by consistent segments.
    pub records: u64,
    /// Highest sequence number among consistent segments.
    pub newest: Option<SequenceNumber>,
}

impl RepositoryScan {
    /// Returns true if no segment is torn or malformed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.torn == 0 && self.malformed == 0
    }
}

/// Reads segments from a repository.
pub struct RepositoryReader<'a> {
    store: &'a dyn BlockStore,
    geometry: Geometry,
    tail: Vec<u8>,
}

impl<'a> RepositoryReader<'a> {
    /// Creates a reader over `store` laid out as `geometry`.
    #[must_use]
    pub fn new(store: &'a dyn BlockStore, geometry: Geometry) -> Self {
        let block = usize::try_from(store.block_size()).unwrap_or(usize::MAX);
        let tail_len = TRAILER_SIZE.div_ceil(block).saturating_mul(block);
        Self {
            store,
            geometry,
            tail: vec![0u8; tail_len.min(geometry.segment_len())],
        }
    }

    /// Opens a reader whose segment size is taken from the repository's first
    /// header and whose region covers the whole store.
    ///
    /// Returns `None` for an empty repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the first header cannot be read or is malformed.
    pub fn open(store: &'a dyn BlockStore) -> CoreResult<Option<Self>> {
        let Some(segment_size) = probe_segment_size(store)? else {
            return Ok(None);
        };
        let size = store.size()?.max(segment_size);
        let geometry = Geometry::new(segment_size, size)?;
        Ok(Some(Self::new(store, geometry)))
    }

    /// Returns the geometry the reader uses.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Reads and classifies segment `index`.
    ///
    /// The trailer is read before the body, so a segment overwritten between
    /// the two reads shows up as torn rather than as a mix of two writes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a read fails.
    pub fn read_segment(&mut self, index: SegmentIndex) -> CoreResult<SegmentRead> {
        let seg_len = self.geometry.segment_len();
        let start = self.geometry.offset_of(index);

        let tail_offset = start + (seg_len - self.tail.len()) as u64;
        let n = self.store.read_at(tail_offset, &mut self.tail)?;
        if n < self.tail.len() {
            return Ok(SegmentRead::Empty);
        }
        let trailer = SegmentTrailer::decode(&self.tail[self.tail.len() - TRAILER_SIZE..])
            .map_err(|err| CoreError::corrupt_header(start, err.to_string()))?;

        let mut data = vec![0u8; seg_len];
        let n = self.store.read_at(start, &mut data)?;
        if n < seg_len {
            return Ok(SegmentRead::Empty);
        }
        let header = match SegmentHeader::decode(&data) {
            Ok(header) => header,
            Err(DecodeError::NoData) => return Ok(SegmentRead::Empty),
            Err(DecodeError::Truncated(_)) => return Ok(SegmentRead::Empty),
        };

        if let Some(reason) = self.header_problem(&header) {
            return Ok(SegmentRead::Malformed { reason });
        }
        if header.seq_nr != trailer.seq_nr {
            return Ok(SegmentRead::Torn { header, trailer });
        }
        Ok(SegmentRead::Valid(SegmentView {
            index,
            header,
            trailer,
            data,
        }))
    }

    fn header_problem(&self, header: &SegmentHeader) -> Option<String> {
        if header.seq_nr.is_zero() {
            return Some("sequence number is zero".to_string());
        }
        if header.version != FORMAT_VERSION {
            return Some(format!("format version {}", header.version));
        }
        if header.segment_size != self.geometry.segment_size() {
            return Some(format!("segment size {}", header.segment_size));
        }
        None
    }

    /// Iterates every segment slot in offset order.
    pub fn segments(&mut self) -> Segments<'_, 'a> {
        Segments {
            reader: self,
            next: 0,
        }
    }

    /// Reads every segment and summarises the repository.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a read fails.
    pub fn scan(&mut self) -> CoreResult<RepositoryScan> {
        let mut scan = RepositoryScan::default();
        for item in self.segments() {
            let (_, read) = item?;
            match read {
                SegmentRead::Empty => scan.empty += 1,
                SegmentRead::Torn { .. } => scan.torn += 1,
                SegmentRead::Malformed { .. } => scan.malformed += 1,
                SegmentRead::Valid(view) => {
                    scan.valid += 1;
                    scan.records += u64::from(view.record_count());
                    scan.newest = scan.newest.max(Some(view.seq_nr()));
                }
            }
        }
        Ok(scan)
    }

    /// Returns the consistent segments holding records, oldest write first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a read fails.
    pub fn valid_segments(&mut self) -> CoreResult<Vec<SegmentView>> {
        let mut views = Vec::new();
        for item in self.segments() {
            if let (_, SegmentRead::Valid(view)) = item? {
                if view.record_count() > 0 {
                    views.push(view);
                }
            }
        }
        views.sort_by_key(SegmentView::seq_nr);
        Ok(views)
    }
}

/// Iterator over every segment slot of a repository.
pub struct Segments<'r, 'a> {
    reader: &'r mut RepositoryReader<'a>,
    next: u64,
}

impl Iterator for Segments<'_, '_> {
    type Item = CoreResult<(SegmentIndex, SegmentRead)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.geometry.segment_count() {
            return None;
        }
        let index = SegmentIndex(self.next);
        self.next += 1;
        Some(self.reader.read_segment(index).map(|read| (index, read)))
    }
}

/// Returns the segment size recorded in the repository's first header, or
/// `None` if the repository is empty.
///
/// # Errors
///
/// Returns an error if the header cannot be read, or if it is malformed:
/// zero sequence number, unknown version, or a segment size outside
/// `(SEGMENT_OVERHEAD, i32::MAX)`.
pub fn probe_segment_size(store: &dyn BlockStore) -> CoreResult<Option<u64>> {
    let block = usize::try_from(store.block_size()).unwrap_or(usize::MAX);
    let mut buf = vec![0u8; HEADER_SIZE.div_ceil(block).saturating_mul(block)];
    let n = store.read_at(0, &mut buf)?;
    let header = match SegmentHeader::decode(&buf[..n]) {
        Ok(header) => header,
        Err(_) => return Ok(None),
    };
    if header.seq_nr.is_zero() {
        return Err(CoreError::corrupt_header(0, "sequence number is zero"));
    }
    if header.version != FORMAT_VERSION {
        return Err(CoreError::VersionMismatch {
            expected: FORMAT_VERSION,
            found: header.version,
        });
    }
    Geometry::new(header.segment_size, header.segment_size)
        .map_err(|_| CoreError::corrupt_header(0, format!("segment size {}", header.segment_size)))?;
    Ok(Some(header.segment_size))
}
