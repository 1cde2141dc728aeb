//! Core type definitions for the ADDB sink.

use std::fmt;

/// Sequence number stamped into a persisted segment.
///
/// Every physical segment write carries a distinct sequence number and the
/// numbers increase by one per write in persist order. Zero is reserved: a
/// header whose sequence number is zero was never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The reserved "never written" value.
    pub const ZERO: Self = Self(0);

    /// The sequence number given to the first segment of a fresh repository.
    pub const FIRST: Self = Self(1);

    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for the reserved zero value.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns the next sequence number, or `None` on overflow.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(seq) => Some(Self(seq)),
            None => None,
        }
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Position of a segment within the circular repository region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SegmentIndex(pub u64);

impl SegmentIndex {
    /// Creates a new segment index.
    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SegmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_next() {
        let s1 = SequenceNumber::new(5);
        assert_eq!(s1.checked_next().map(SequenceNumber::as_u64), Some(6));
        assert!(Some(s1) < s1.checked_next());
    }

    #[test]
    fn sequence_number_checked_next_overflows() {
        assert_eq!(SequenceNumber::new(u64::MAX).checked_next(), None);
        assert_eq!(SequenceNumber::ZERO.checked_next(), Some(SequenceNumber::FIRST));
    }

    #[test]
    fn zero_is_reserved() {
        assert!(SequenceNumber::default().is_zero());
        assert!(!SequenceNumber::FIRST.is_zero());
    }

    #[test]
    fn display_formats() {
        assert_eq!(format!("{}", SequenceNumber::new(42)), "seq:42");
        assert_eq!(format!("{}", SegmentIndex::new(7)), "seg:7");
    }
}
