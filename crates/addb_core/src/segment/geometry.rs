//! Repository geometry: how segments tile the circular region.

use super::format::{HEADER_SIZE, SEGMENT_OVERHEAD, TRAILER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::types::SegmentIndex;

/// The fixed layout of a repository: `segment_count` segments of
/// `segment_size` bytes starting at offset zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    segment_size: u64,
    segment_count: u64,
}

impl Geometry {
    /// Creates the geometry of a `stob_size`-byte region cut into
    /// `segment_size`-byte segments. A trailing partial segment is unused.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the segment size is outside
    /// `(SEGMENT_OVERHEAD, i32::MAX)` or the region holds no segment.
    pub fn new(segment_size: u64, stob_size: u64) -> CoreResult<Self> {
        if segment_size <= SEGMENT_OVERHEAD as u64 || segment_size >= i32::MAX as u64 {
            return Err(CoreError::invalid_config(format!(
                "segment size {segment_size} is out of range"
            )));
        }
        let segment_count = stob_size / segment_size;
        if segment_count == 0 {
            return Err(CoreError::invalid_config(format!(
                "stob size {stob_size} holds no segment of {segment_size} bytes"
            )));
        }
        Ok(Self {
            segment_size,
            segment_count,
        })
    }

    /// Returns the segment size in bytes.
    #[must_use]
    pub const fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Returns the segment size as an in-memory length.
    #[must_use]
    pub const fn segment_len(&self) -> usize {
        // below i32::MAX, so lossless on every supported target
        self.segment_size as usize
    }

    /// Returns the number of segments in the region.
    #[must_use]
    pub const fn segment_count(&self) -> u64 {
        self.segment_count
    }

    /// Returns the bytes covered by whole segments.
    #[must_use]
    pub const fn region_size(&self) -> u64 {
        self.segment_size * self.segment_count
    }

    /// Returns the index of the last segment.
    #[must_use]
    pub const fn last_index(&self) -> SegmentIndex {
        SegmentIndex(self.segment_count - 1)
    }

    /// Returns the bytes of one segment available to records.
    #[must_use]
    pub const fn record_capacity(&self) -> usize {
        self.segment_len() - SEGMENT_OVERHEAD
    }

    /// Returns the in-segment range records may occupy.
    #[must_use]
    pub const fn record_region(&self) -> std::ops::Range<usize> {
        HEADER_SIZE..self.trailer_start()
    }

    /// Returns the in-segment position of the trailer.
    #[must_use]
    pub const fn trailer_start(&self) -> usize {
        self.segment_len() - TRAILER_SIZE
    }

    /// Returns the byte offset of segment `index`.
    #[must_use]
    pub const fn offset_of(&self, index: SegmentIndex) -> u64 {
        index.0 * self.segment_size
    }

    /// Returns the index of the segment starting at or containing `offset`.
    #[must_use]
    pub const fn index_of(&self, offset: u64) -> SegmentIndex {
        SegmentIndex(offset / self.segment_size)
    }

    /// Returns the offset of the segment after the one at `offset`, wrapping
    /// from the last segment back to zero.
    #[must_use]
    pub const fn next_offset(&self, offset: u64) -> u64 {
        let next = offset + self.segment_size;
        if next >= self.region_size() {
            0
        } else {
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_trailing_segment_unused() {
        let geometry = Geometry::new(1000, 10_500).unwrap();
        assert_eq!(geometry.segment_count(), 10);
        assert_eq!(geometry.region_size(), 10_000);
        assert_eq!(geometry.last_index(), SegmentIndex(9));
    }

    #[test]
    fn next_offset_wraps_at_region_end() {
        let geometry = Geometry::new(256, 4 * 256).unwrap();
        assert_eq!(geometry.next_offset(0), 256);
        assert_eq!(geometry.next_offset(512), 768);
        assert_eq!(geometry.next_offset(768), 0);
    }

    #[test]
    fn single_segment_wraps_to_itself() {
        let geometry = Geometry::new(256, 300).unwrap();
        assert_eq!(geometry.segment_count(), 1);
        assert_eq!(geometry.next_offset(0), 0);
    }

    #[test]
    fn record_region_excludes_header_and_trailer() {
        let geometry = Geometry::new(256, 256).unwrap();
        assert_eq!(geometry.record_capacity(), 220);
        assert_eq!(geometry.record_region(), 20..240);
        assert_eq!(geometry.trailer_start(), 240);
    }

    #[test]
    fn index_and_offset_agree() {
        let geometry = Geometry::new(512, 8 * 512).unwrap();
        assert_eq!(geometry.offset_of(SegmentIndex(3)), 1536);
        assert_eq!(geometry.index_of(1536), SegmentIndex(3));
        assert_eq!(geometry.index_of(1600), SegmentIndex(3));
    }

    #[test]
    fn invalid_geometry_rejected() {
        assert!(Geometry::new(36, 1000).is_err());
        assert!(Geometry::new(512, 511).is_err());
        assert!(Geometry::new(i32::MAX as u64, u64::MAX).is_err());
    }
}
