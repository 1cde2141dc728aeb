//! Test fixtures and repository helpers.
//!
//! Provides sink configurations sized for tests, repositories laid out
//! segment by segment without going through a sink, and helpers that read
//! every stored record back.

use addb_core::{
    FramedRecord, Geometry, RecordBatch, RepositoryReader, SegmentHeader, SegmentIndex,
    SegmentTrailer, SequenceNumber, SinkConfig, HEADER_SIZE,
};
use addb_storage::{BlockStore, FileStore, MemoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Returns a configuration of `segments` segments of `segment_size` bytes
/// with a flush timeout long enough never to fire during a test.
#[must_use]
pub fn small_config(segment_size: u64, segments: u64) -> SinkConfig {
    SinkConfig::new()
        .segment_size(segment_size)
        .stob_size(segment_size * segments)
        .flush_timeout(Duration::from_secs(3600))
}

/// Returns a zero-filled memory store covering `geometry`.
///
/// Torn writes only show up as torn when the slot's trailer bytes already
/// exist, so tests about tearing start from a preallocated store.
#[must_use]
pub fn preallocated_store(geometry: Geometry) -> MemoryStore {
    let len = usize::try_from(geometry.region_size()).expect("region fits in memory");
    MemoryStore::with_data(vec![0u8; len])
}

/// Builds the bytes of one sealed segment holding `payloads` as framed
/// records.
///
/// # Panics
///
/// Panics if the payloads do not fit in one segment.
#[must_use]
pub fn segment_bytes(geometry: Geometry, seq_nr: u64, payloads: &[&[u8]]) -> Vec<u8> {
    let mut batch = RecordBatch::new();
    for payload in payloads {
        batch
            .push(&FramedRecord::new(payload))
            .expect("payload length fits in u32");
    }
    let body = batch.to_bytes();
    let records = &body[4..];
    assert!(
        records.len() <= geometry.record_capacity(),
        "{} bytes of records exceed segment capacity {}",
        records.len(),
        geometry.record_capacity()
    );

    let seq_nr = SequenceNumber::new(seq_nr);
    let mut data = vec![0u8; geometry.segment_len()];
    data[..HEADER_SIZE]
        .copy_from_slice(&SegmentHeader::new(seq_nr, geometry.segment_size()).to_bytes());
    data[HEADER_SIZE..HEADER_SIZE + records.len()].copy_from_slice(records);
    let trailer_start = geometry.trailer_start();
    data[trailer_start..].copy_from_slice(&SegmentTrailer::new(seq_nr, batch.count()).to_bytes());
    data
}

/// Writes a sealed segment into slot `index`.
///
/// # Panics
///
/// Panics if the write fails.
pub fn write_segment(
    store: &dyn BlockStore,
    geometry: Geometry,
    index: u64,
    seq_nr: u64,
    payloads: &[&[u8]],
) {
    let data = segment_bytes(geometry, seq_nr, payloads);
    store
        .write_at(geometry.offset_of(SegmentIndex(index)), &data)
        .expect("Failed to write segment");
}

/// Returns a memory store whose slots carry the given sequence numbers, in
/// slot order. A zero leaves the slot unwritten; the store always covers
/// every slot.
#[must_use]
pub fn repository_with_sequences(segment_size: u64, sequences: &[u64]) -> Arc<MemoryStore> {
    let segments = sequences.len() as u64;
    let geometry =
        Geometry::new(segment_size, segment_size * segments).expect("valid test geometry");
    let store = Arc::new(preallocated_store(geometry));
    for (index, &seq_nr) in sequences.iter().enumerate() {
        if seq_nr != 0 {
            write_segment(store.as_ref(), geometry, index as u64, seq_nr, &[]);
        }
    }
    store
}

/// Returns the sequence numbers a sink leaves in `segments` slots after
/// persisting `writes` segments: the writes go round the ring in slot order,
/// so later writes overwrite earlier ones. Unwritten slots are zero.
#[must_use]
pub fn circular_layout(segments: u64, writes: u64) -> Vec<u64> {
    let mut slots = vec![0u64; segments as usize];
    for seq_nr in 1..=writes {
        slots[((seq_nr - 1) % segments) as usize] = seq_nr;
    }
    slots
}

/// Reads every framed record from the repository's consistent segments,
/// oldest segment first.
///
/// # Panics
///
/// Panics if the repository cannot be read or a record is malformed.
#[must_use]
pub fn collect_records(store: &dyn BlockStore, geometry: Geometry) -> Vec<Vec<u8>> {
    let mut reader = RepositoryReader::new(store, geometry);
    let mut records = Vec::new();
    for view in reader.valid_segments().expect("Failed to read repository") {
        for record in view.framed_records() {
            records.push(record.expect("Malformed framed record").to_vec());
        }
    }
    records
}

/// A file-backed repository in a temporary directory.
pub struct TempRepository {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempRepository {
    /// Creates a temporary directory for a repository file.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("addb").join("stob.dat");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the repository file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the repository file with `block_shift`, creating it if needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be opened.
    #[must_use]
    pub fn open(&self, block_shift: u32) -> Arc<FileStore> {
        Arc::new(
            FileStore::open_with_create_dirs(&self.path, block_shift)
                .expect("Failed to open file store"),
        )
    }
}

impl Default for TempRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test against a file-backed repository that is removed afterwards.
///
/// # Example
///
/// ```rust
/// use addb_testkit::with_temp_repository;
///
/// with_temp_repository(|repo| {
///     let store = repo.open(9);
///     assert_eq!(store.path(), repo.path());
/// });
/// ```
pub fn with_temp_repository<F, R>(f: F) -> R
where
    F: FnOnce(&TempRepository) -> R,
{
    let repo = TempRepository::new();
    f(&repo)
}
