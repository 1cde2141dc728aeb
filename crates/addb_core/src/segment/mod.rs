//! Segment format, repository geometry, startup location and read-back.

mod format;
mod geometry;
mod locate;
mod reader;

pub use format::{
    DecodeError, InsufficientSpace, SegmentHeader, SegmentTrailer, FORMAT_VERSION, HEADER_SIZE,
    SEGMENT_OVERHEAD, TRAILER_SIZE,
};
pub use geometry::Geometry;
pub use locate::{locate_resume_point, Locator, ResumePoint};
pub use reader::{
    probe_segment_size, FramedRecords, RepositoryReader, RepositoryScan, SegmentRead, SegmentView,
    Segments,
};
