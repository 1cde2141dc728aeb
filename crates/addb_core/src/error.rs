//! Error types for the ADDB sink.

use crate::segment::InsufficientSpace;
use std::fmt;
use thiserror::Error;

/// Result type for configure and shutdown operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type for append operations.
pub type AppendResult = Result<(), AppendError>;

/// Errors raised while configuring, locating or shutting down a sink.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage error, including an unexpected failure reading the
    /// repository's first header.
    #[error("storage error: {0}")]
    Storage(#[from] addb_storage::StorageError),

    /// The configuration cannot describe a valid repository.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The repository was written with a different segment size.
    #[error("segment size mismatch: configured {configured}, repository has {stored}")]
    SegmentSizeMismatch {
        /// The configured segment size.
        configured: u64,
        /// The segment size found in the repository.
        stored: u64,
    },

    /// The repository was written with an unknown format version.
    #[error("segment format version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// The version this crate writes.
        expected: u32,
        /// The version found in the repository.
        found: u32,
    },

    /// A persisted header is internally inconsistent.
    #[error("corrupt segment header at offset {offset}: {message}")]
    CorruptHeader {
        /// Byte offset of the segment.
        offset: u64,
        /// Description of the problem.
        message: String,
    },

    /// Segment buffer memory could not be allocated.
    #[error("out of memory allocating {requested} bytes of segment buffers")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
    },

    /// The repository's newest sequence number cannot be incremented.
    #[error("sequence number space exhausted")]
    SequenceExhausted,

    /// Segment writes outstanding at shutdown failed.
    #[error("{failed} segment write(s) failed while shutting down")]
    FlushFailed {
        /// Number of failed writes.
        failed: u64,
    },
}

impl CoreError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a corrupt header error.
    pub fn corrupt_header(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptHeader {
            offset,
            message: message.into(),
        }
    }

    /// Returns true if the error means the configuration and the repository
    /// disagree, as opposed to an I/O or resource failure.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::SegmentSizeMismatch { .. }
                | Self::VersionMismatch { .. }
                | Self::CorruptHeader { .. }
        )
    }
}

/// Why an append was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The current segment buffer is being written and no idle buffer was
    /// available.
    BufferBusy,
    /// The buffer pool could not grow because memory was unavailable.
    OutOfMemory,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferBusy => f.write_str("segment buffer busy"),
            Self::OutOfMemory => f.write_str("out of memory"),
        }
    }
}

/// Outcome of an append that did not store its record.
///
/// Appends never block and never panic. A `Dropped` append is the sink's
/// normal lossy behaviour under pressure; the other variants mean the caller
/// handed the sink something it can never store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    /// The record was discarded.
    #[error("record dropped: {0}")]
    Dropped(DropReason),

    /// The record cannot fit in an empty segment.
    #[error("record of {len} bytes exceeds segment capacity of {capacity} bytes")]
    TooLarge {
        /// Encoded record length.
        len: usize,
        /// Record capacity of one segment.
        capacity: usize,
    },

    /// A record sequence is too short to carry its record count.
    #[error("record sequence of {len} bytes lacks its record count")]
    InvalidBatch {
        /// Length of the rejected sequence.
        len: usize,
    },

    /// The record wrote more bytes than it declared.
    #[error("record encoding failed: {0}")]
    Encode(#[from] InsufficientSpace),
}

impl AppendError {
    /// Returns true if the append was dropped under pressure.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_classified() {
        assert!(CoreError::invalid_config("x").is_config_error());
        assert!(CoreError::VersionMismatch {
            expected: 1,
            found: 2
        }
        .is_config_error());
        assert!(!CoreError::OutOfMemory { requested: 1 }.is_config_error());
        assert!(!CoreError::from(addb_storage::StorageError::Closed).is_config_error());
    }

    #[test]
    fn drop_reason_display() {
        let err = AppendError::Dropped(DropReason::BufferBusy);
        assert_eq!(err.to_string(), "record dropped: segment buffer busy");
        assert!(err.is_dropped());
        assert!(!AppendError::InvalidBatch { len: 2 }.is_dropped());
    }
}
