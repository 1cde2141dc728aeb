//! Inspect command implementation.

use super::{open_repository, repository_geometry, CommandResult, OutputFormat};
use addb_core::{locate_resume_point, Geometry, RepositoryReader, RepositoryScan, SegmentRead};
use addb_storage::BlockStore;
use serde::Serialize;
use std::path::Path;

/// Repository inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Repository path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Segment size the slots were read with.
    pub segment_size: u64,
    /// Number of segment slots in the file.
    pub segment_count: u64,
    /// Slot counts by status.
    pub summary: ScanSummary,
    /// Where a sink configured over the whole file would resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumeReport>,
    /// Why the resume point could not be determined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_error: Option<String>,
    /// One entry per slot, in offset order.
    pub segments: Vec<SegmentReport>,
}

/// Slot counts by status.
#[derive(Debug, Default, Serialize)]
pub struct ScanSummary {
    /// Consistent segments.
    pub valid: u64,
    /// Torn segments.
    pub torn: u64,
    /// Segments with malformed headers.
    pub malformed: u64,
    /// Never-written slots.
    pub empty: u64,
    /// Records declared by consistent segments.
    pub records: u64,
    /// Highest sequence number among consistent segments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<u64>,
}

impl From<RepositoryScan> for ScanSummary {
    fn from(scan: RepositoryScan) -> Self {
        Self {
            valid: scan.valid,
            torn: scan.torn,
            malformed: scan.malformed,
            empty: scan.empty,
            records: scan.records,
            newest: scan.newest.map(|seq| seq.as_u64()),
        }
    }
}

/// The resume point.
#[derive(Debug, Serialize)]
pub struct ResumeReport {
    /// Sequence number of the next persisted segment.
    pub seq_nr: u64,
    /// Byte offset of the next segment written.
    pub offset: u64,
}

/// Status of one segment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Consistent.
    Valid,
    /// Header and trailer disagree.
    Torn,
    /// The header is not one this repository could have written.
    Malformed,
    /// Never written.
    Empty,
}

impl SegmentStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Torn => "torn",
            Self::Malformed => "malformed",
            Self::Empty => "empty",
        }
    }
}

/// One segment slot.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    /// Slot index.
    pub index: u64,
    /// Byte offset of the slot.
    pub offset: u64,
    /// Slot status.
    pub status: SegmentStatus,
    /// Header sequence number, when the header was decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_seq: Option<u64>,
    /// Trailer sequence number, when the trailer was decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer_seq: Option<u64>,
    /// Records the trailer declares.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<u32>,
    /// Payload length of each framed record (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_lengths: Option<Vec<usize>>,
    /// Why the slot is malformed, or why its records do not decode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    segment_size: Option<u64>,
    show_records: bool,
    format: OutputFormat,
) -> CommandResult<()> {
    let store = open_repository(path)?;
    let Some(geometry) = repository_geometry(&store, segment_size)? else {
        println!("Repository at {:?} is empty", path);
        return Ok(());
    };

    let mut result = inspect(&store, geometry, show_records)?;
    result.path = path.display().to_string();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Reads every slot of `store` laid out as `geometry`.
pub fn inspect(
    store: &dyn BlockStore,
    geometry: Geometry,
    show_records: bool,
) -> CommandResult<InspectResult> {
    let mut reader = RepositoryReader::new(store, geometry);
    let mut segments = Vec::new();
    for item in reader.segments() {
        let (index, read) = item?;
        segments.push(report(geometry.offset_of(index), index.0, read, show_records));
    }
    let summary = ScanSummary::from(reader.scan()?);

    let (resume, resume_error) = match locate_resume_point(store, geometry) {
        Ok(point) => (
            Some(ResumeReport {
                seq_nr: point.seq_nr.as_u64(),
                offset: point.offset,
            }),
            None,
        ),
        Err(err) => (None, Some(err.to_string())),
    };

    Ok(InspectResult {
        path: String::new(),
        file_size: store.size()?,
        segment_size: geometry.segment_size(),
        segment_count: geometry.segment_count(),
        summary,
        resume,
        resume_error,
        segments,
    })
}

fn report(offset: u64, index: u64, read: SegmentRead, show_records: bool) -> SegmentReport {
    let mut report = SegmentReport {
        index,
        offset,
        status: SegmentStatus::Empty,
        header_seq: None,
        trailer_seq: None,
        records: None,
        record_lengths: None,
        detail: None,
    };
    match read {
        SegmentRead::Empty => {}
        SegmentRead::Malformed { reason } => {
            report.status = SegmentStatus::Malformed;
            report.detail = Some(reason);
        }
        SegmentRead::Torn { header, trailer } => {
            report.status = SegmentStatus::Torn;
            report.header_seq = Some(header.seq_nr.as_u64());
            report.trailer_seq = Some(trailer.seq_nr.as_u64());
        }
        SegmentRead::Valid(view) => {
            report.status = SegmentStatus::Valid;
            report.header_seq = Some(view.seq_nr().as_u64());
            report.trailer_seq = Some(view.trailer().seq_nr.as_u64());
            report.records = Some(view.record_count());
            if show_records {
                let mut lengths = Vec::new();
                for record in view.framed_records() {
                    match record {
                        Ok(payload) => lengths.push(payload.len()),
                        Err(err) => {
                            report.detail = Some(format!(
                                "record {} is not a valid frame: {}",
                                lengths.len(),
                                err
                            ));
                            break;
                        }
                    }
                }
                report.record_lengths = Some(lengths);
            }
        }
    }
    report
}

fn print_text_output(result: &InspectResult) {
    println!("ADDB Repository Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!("File size: {} bytes", result.file_size);
    println!(
        "Segments: {} of {} bytes",
        result.segment_count, result.segment_size
    );
    println!();

    println!("Summary:");
    println!("  Valid: {}", result.summary.valid);
    println!("  Torn: {}", result.summary.torn);
    println!("  Malformed: {}", result.summary.malformed);
    println!("  Empty: {}", result.summary.empty);
    println!("  Records: {}", result.summary.records);
    if let Some(newest) = result.summary.newest {
        println!("  Newest sequence: {}", newest);
    }
    match (&result.resume, &result.resume_error) {
        (Some(resume), _) => println!(
            "  Resume at: offset {} with sequence {}",
            resume.offset, resume.seq_nr
        ),
        (None, Some(err)) => println!("  Resume at: unknown ({})", err),
        (None, None) => {}
    }
    println!();

    println!(
        "{:>6}  {:>12}  {:<9}  {:>10}  {:>10}  {:>8}",
        "INDEX", "OFFSET", "STATUS", "HEADER", "TRAILER", "RECORDS"
    );
    for segment in &result.segments {
        println!(
            "{:>6}  {:>12}  {:<9}  {:>10}  {:>10}  {:>8}",
            segment.index,
            segment.offset,
            segment.status.as_str(),
            optional(segment.header_seq),
            optional(segment.trailer_seq),
            optional(segment.records),
        );
        if let Some(lengths) = &segment.record_lengths {
            println!("        record lengths: {:?}", lengths);
        }
        if let Some(detail) = &segment.detail {
            println!("        {}", detail);
        }
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use addb_core::{SegmentHeader, SequenceNumber};
    use addb_storage::MemoryStore;
    use addb_testkit::{preallocated_store, write_segment};

    #[test]
    fn reports_every_slot() {
        let geometry = Geometry::new(256, 1024).unwrap();
        let store = preallocated_store(geometry);
        write_segment(&store, geometry, 0, 5, &[b"abc", b"de"]);
        write_segment(&store, geometry, 1, 2, &[b"f"]);
        // slot 2 torn: new header over an old trailer
        write_segment(&store, geometry, 2, 3, &[]);
        let newer = SegmentHeader::new(SequenceNumber::new(6), 256);
        store.write_at(512, &newer.to_bytes()).unwrap();

        let result = inspect(&store, geometry, true).unwrap();
        let statuses: Vec<SegmentStatus> = result.segments.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                SegmentStatus::Valid,
                SegmentStatus::Valid,
                SegmentStatus::Torn,
                SegmentStatus::Empty
            ]
        );
        assert_eq!(result.segments[0].record_lengths, Some(vec![3, 2]));
        assert_eq!(result.segments[2].header_seq, Some(6));
        assert_eq!(result.segments[2].trailer_seq, Some(3));
        assert_eq!(result.summary.records, 3);
        assert_eq!(result.summary.newest, Some(5));

        // 5 2 6 0: the newer run ends at slot 0
        let resume = result.resume.unwrap();
        assert_eq!((resume.seq_nr, resume.offset), (6, 256));
    }

    #[test]
    fn json_output_names_statuses() {
        let geometry = Geometry::new(256, 512).unwrap();
        let store = MemoryStore::new();
        write_segment(&store, geometry, 0, 1, &[]);

        let result = inspect(&store, geometry, false).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["segments"][0]["status"], "valid");
        assert_eq!(json["segments"][1]["status"], "empty");
        assert_eq!(json["resume"]["seq_nr"], 2);
        assert!(json["segments"][0].get("record_lengths").is_none());
    }

    #[test]
    fn slots_past_end_of_file_read_as_empty() {
        let store = MemoryStore::new();
        let written = Geometry::new(256, 256).unwrap();
        write_segment(&store, written, 0, 1, &[b"x"]);

        // a geometry far larger than the file
        let geometry = Geometry::new(256, 256 * 1024).unwrap();
        let result = inspect(&store, geometry, false).unwrap();
        assert_eq!(result.segments.len(), 1024);
        assert_eq!(result.file_size, 256);
        assert_eq!(result.summary.valid, 1);
        assert_eq!(result.summary.empty, 1023);
    }

    #[test]
    fn resume_error_is_reported_not_raised() {
        let geometry = Geometry::new(256, 512).unwrap();
        let store = MemoryStore::new();
        write_segment(&store, geometry, 0, 1, &[]);

        let other = Geometry::new(128, 512).unwrap();
        let result = inspect(&store, other, false).unwrap();
        assert!(result.resume.is_none());
        assert!(result.resume_error.unwrap().contains("segment size mismatch"));
        assert_eq!(result.summary.malformed, 1);
    }
}
