//! Startup location of the newest persisted segment.
//!
//! Segments are written in offset order, wrapping from the last segment to
//! the first. The sequence numbers read by offset therefore form at most two
//! ascending runs: a newer run starting at segment 0, followed by an older
//! run (or never-written segments, read as zero). The newest segment is the
//! last one of the first run.

use super::format::{DecodeError, SegmentHeader, FORMAT_VERSION, HEADER_SIZE};
use super::geometry::Geometry;
use crate::error::{CoreError, CoreResult};
use crate::types::{SegmentIndex, SequenceNumber};
use addb_storage::BlockStore;
use tracing::{debug, info, warn};

/// Where a sink resumes writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    /// Sequence number for the next persisted segment.
    pub seq_nr: SequenceNumber,
    /// Byte offset of the next segment to write.
    pub offset: u64,
}

impl ResumePoint {
    /// The resume point of a repository that was never written.
    pub const EMPTY: Self = Self {
        seq_nr: SequenceNumber::FIRST,
        offset: 0,
    };
}

/// Reads segment headers to find the resume point.
pub struct Locator<'a> {
    store: &'a dyn BlockStore,
    geometry: Geometry,
    scratch: Vec<u8>,
    reads: u64,
}

impl<'a> Locator<'a> {
    /// Creates a locator. Header reads use the smallest whole number of
    /// blocks covering a header.
    #[must_use]
    pub fn new(store: &'a dyn BlockStore, geometry: Geometry) -> Self {
        let block = usize::try_from(store.block_size()).unwrap_or(usize::MAX);
        let read_len = HEADER_SIZE.div_ceil(block).saturating_mul(block);
        Self {
            store,
            geometry,
            scratch: vec![0u8; read_len.min(geometry.segment_len())],
            reads: 0,
        }
    }

    /// Returns the number of header reads issued so far.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Finds where writing resumes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the first header cannot be read, and a
    /// configuration error if it belongs to a repository with a different
    /// segment size or format version, or is corrupt.
    pub fn locate(&mut self) -> CoreResult<ResumePoint> {
        let Some(first) = self.read_header(SegmentIndex(0))? else {
            info!("empty ADDB repository, starting at offset 0");
            return Ok(ResumePoint::EMPTY);
        };
        self.check_header(&first)?;

        let resume = self.search(first.seq_nr.as_u64())?;
        info!(
            "resuming ADDB repository at offset {} with {}",
            resume.offset, resume.seq_nr
        );
        Ok(resume)
    }

    fn check_header(&self, header: &SegmentHeader) -> CoreResult<()> {
        if header.seq_nr.is_zero() {
            return Err(CoreError::corrupt_header(0, "sequence number is zero"));
        }
        if header.version != FORMAT_VERSION {
            return Err(CoreError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: header.version,
            });
        }
        if header.segment_size != self.geometry.segment_size() {
            return Err(CoreError::SegmentSizeMismatch {
                configured: self.geometry.segment_size(),
                stored: header.segment_size,
            });
        }
        Ok(())
    }

    /// Binary search for the last index of the newer run.
    ///
    /// `lo` always holds a sequence number at least `first`, `hi` one below
    /// it, so the newest segment is `lo` once they are adjacent.
    fn search(&mut self, first: u64) -> CoreResult<ResumePoint> {
        let last = self.geometry.last_index();
        let seq_last = if last.0 == 0 {
            first
        } else {
            self.sequence_at(last)
        };
        if seq_last >= first {
            return Ok(ResumePoint {
                seq_nr: successor(seq_last)?,
                offset: 0,
            });
        }

        let (mut lo, mut hi, mut seq_lo) = (0u64, last.0, first);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            let seq_mid = self.sequence_at(SegmentIndex(mid));
            if seq_mid >= first {
                lo = mid;
                seq_lo = seq_mid;
            } else {
                hi = mid;
            }
        }
        debug!("newest ADDB segment is seg:{} after {} header reads", lo, self.reads);

        Ok(ResumePoint {
            seq_nr: successor(seq_lo)?,
            offset: self.geometry.offset_of(SegmentIndex(hi)),
        })
    }

    /// Sequence number at `index`, with unreadable or empty headers as zero.
    fn sequence_at(&mut self, index: SegmentIndex) -> u64 {
        match self.read_header(index) {
            Ok(Some(header)) => header.seq_nr.as_u64(),
            Ok(None) => 0,
            Err(err) => {
                warn!("unreadable ADDB segment header at {}: {}", index, err);
                0
            }
        }
    }

    fn read_header(&mut self, index: SegmentIndex) -> CoreResult<Option<SegmentHeader>> {
        let offset = self.geometry.offset_of(index);
        self.reads += 1;
        let n = self.store.read_at(offset, &mut self.scratch)?;
        if n < HEADER_SIZE {
            return Ok(None);
        }
        match SegmentHeader::decode(&self.scratch[..n]) {
            Ok(header) => Ok(Some(header)),
            Err(DecodeError::NoData | DecodeError::Truncated(_)) => Ok(None),
        }
    }
}

fn successor(seq: u64) -> CoreResult<SequenceNumber> {
    SequenceNumber::new(seq)
        .checked_next()
        .ok_or(CoreError::SequenceExhausted)
}

/// Finds where a sink over `store` with `geometry` would resume writing.
///
/// # Errors
///
/// See [`Locator::locate`].
pub fn locate_resume_point(store: &dyn BlockStore, geometry: Geometry) -> CoreResult<ResumePoint> {
    Locator::new(store, geometry).locate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::format::SegmentTrailer;
    use addb_storage::{MemoryStore, StorageError, StorageResult, WriteCallback, WriteRequest};
    use proptest::prelude::*;

    const SEG: u64 = 128;

    fn repository(seqs: &[u64]) -> (MemoryStore, Geometry) {
        let store = MemoryStore::new();
        for (i, &seq) in seqs.iter().enumerate() {
            if seq == 0 {
                continue;
            }
            let mut segment = vec![0u8; SEG as usize];
            SegmentHeader::new(SequenceNumber::new(seq), SEG)
                .encode(&mut segment)
                .unwrap();
            SegmentTrailer::new(SequenceNumber::new(seq), 1)
                .encode(&mut segment[SEG as usize - 16..])
                .unwrap();
            store.write_at(i as u64 * SEG, &segment).unwrap();
        }
        let geometry = Geometry::new(SEG, seqs.len() as u64 * SEG).unwrap();
        (store, geometry)
    }

    fn resume(seqs: &[u64]) -> ResumePoint {
        let (store, geometry) = repository(seqs);
        locate_resume_point(&store, geometry).unwrap()
    }

    fn at(seq: u64, index: u64) -> ResumePoint {
        ResumePoint {
            seq_nr: SequenceNumber::new(seq),
            offset: index * SEG,
        }
    }

    #[test]
    fn empty_repository_starts_fresh() {
        assert_eq!(resume(&[0; 10]), ResumePoint::EMPTY);
    }

    #[test]
    fn unallocated_store_starts_fresh() {
        let store = MemoryStore::new();
        let geometry = Geometry::new(SEG, 10 * SEG).unwrap();
        assert_eq!(locate_resume_point(&store, geometry).unwrap(), ResumePoint::EMPTY);
    }

    #[test]
    fn partially_filled_resumes_after_newest() {
        assert_eq!(resume(&[1, 2, 3, 0, 0, 0, 0, 0, 0, 0]), at(4, 3));
    }

    #[test]
    fn wrapped_resumes_over_oldest() {
        assert_eq!(resume(&[11, 12, 13, 14, 15, 16, 17, 18, 9, 10]), at(19, 8));
    }

    #[test]
    fn newest_at_last_index_wraps_to_zero() {
        assert_eq!(resume(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]), at(11, 0));
        assert_eq!(resume(&[21, 22, 23, 24, 25, 26, 27, 28, 29, 30]), at(31, 0));
    }

    #[test]
    fn newest_at_first_index() {
        assert_eq!(resume(&[11, 2, 3, 4, 5, 6, 7, 8, 9, 10]), at(12, 1));
    }

    #[test]
    fn single_segment_repository() {
        assert_eq!(resume(&[7]), at(8, 0));
    }

    #[test]
    fn two_segment_repository() {
        assert_eq!(resume(&[1, 0]), at(2, 1));
        assert_eq!(resume(&[3, 2]), at(4, 1));
        assert_eq!(resume(&[3, 4]), at(5, 0));
    }

    #[test]
    fn odd_segment_count() {
        assert_eq!(resume(&[8, 9, 5, 6, 7]), at(10, 2));
        assert_eq!(resume(&[1, 2, 3, 4, 0]), at(5, 4));
    }

    #[test]
    fn search_uses_logarithmic_reads() {
        let mut seqs: Vec<u64> = (1..=600).collect();
        seqs.extend(std::iter::repeat(0).take(424));
        let (store, geometry) = repository(&seqs);

        let mut locator = Locator::new(&store, geometry);
        assert_eq!(locator.locate().unwrap(), at(601, 600));
        assert!(locator.reads() <= 2 + 11, "took {} reads", locator.reads());
    }

    #[test]
    fn segment_size_mismatch_rejected() {
        let (store, _) = repository(&[1, 2]);
        let geometry = Geometry::new(2 * SEG, 4 * SEG).unwrap();
        let err = locate_resume_point(&store, geometry).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SegmentSizeMismatch {
                configured: 256,
                stored: 128
            }
        ));
    }

    #[test]
    fn version_mismatch_rejected() {
        let (store, geometry) = repository(&[1, 2]);
        let mut header = SegmentHeader::new(SequenceNumber::new(1), SEG);
        header.version = 9;
        store.write_at(0, &header.to_bytes()).unwrap();

        let err = locate_resume_point(&store, geometry).unwrap_err();
        assert!(matches!(err, CoreError::VersionMismatch { found: 9, .. }));
    }

    #[test]
    fn zero_sequence_with_fields_rejected() {
        let (store, geometry) = repository(&[0, 0]);
        store
            .write_at(0, &SegmentHeader::new(SequenceNumber::ZERO, SEG).to_bytes())
            .unwrap();
        let err = locate_resume_point(&store, geometry).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn exhausted_sequence_rejected() {
        let (store, geometry) = repository(&[u64::MAX]);
        assert!(matches!(
            locate_resume_point(&store, geometry),
            Err(CoreError::SequenceExhausted)
        ));
    }

    struct FailingReads {
        inner: MemoryStore,
        fail_at: u64,
    }

    impl BlockStore for FailingReads {
        fn block_shift(&self) -> u32 {
            0
        }
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<usize> {
            if offset == self.fail_at {
                return Err(StorageError::other("bad block"));
            }
            self.inner.read_at(offset, buf)
        }
        fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
            self.inner.write_at(offset, data)
        }
        fn submit_write(
            &self,
            request: WriteRequest,
            on_complete: WriteCallback,
        ) -> Result<(), addb_storage::LaunchError> {
            self.inner.submit_write(request, on_complete)
        }
        fn sync(&self) -> StorageResult<()> {
            Ok(())
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
    }

    #[test]
    fn unreadable_probe_counts_as_unwritten() {
        let (inner, geometry) = repository(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let store = FailingReads {
            inner,
            fail_at: 7 * SEG,
        };
        // the last header reads as zero, so the search runs and finds 7
        assert_eq!(locate_resume_point(&store, geometry).unwrap(), at(8, 7));
    }

    #[test]
    fn unreadable_first_header_is_an_error() {
        let (inner, geometry) = repository(&[1, 2]);
        let store = FailingReads { inner, fail_at: 0 };
        assert!(matches!(
            locate_resume_point(&store, geometry),
            Err(CoreError::Storage(_))
        ));
    }

    #[test]
    fn block_sized_header_reads() {
        let store = MemoryStore::with_block_shift(6);
        let geometry = Geometry::new(SEG, 4 * SEG).unwrap();
        for (i, seq) in [5u64, 6, 3, 4].into_iter().enumerate() {
            let mut segment = vec![0u8; SEG as usize];
            SegmentHeader::new(SequenceNumber::new(seq), SEG)
                .encode(&mut segment)
                .unwrap();
            store.write_at(i as u64 * SEG, &segment).unwrap();
        }
        assert_eq!(locate_resume_point(&store, geometry).unwrap(), at(7, 2));
    }

    proptest! {
        #[test]
        fn resume_follows_newest_segment(
            count in 1u64..64,
            written in 1u64..200,
            start in 1u64..1_000_000,
        ) {
            // simulate `written` sequential persists over `count` segments
            let mut seqs = vec![0u64; count as usize];
            for n in 0..written {
                seqs[(n % count) as usize] = start + n;
            }
            let newest = (written - 1) % count;
            let expected = at(start + written, (newest + 1) % count);
            prop_assert_eq!(resume(&seqs), expected);
        }
    }
}
