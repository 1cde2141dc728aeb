//! Verify command implementation.

use super::{open_repository, repository_geometry, CommandResult};
use addb_core::{locate_resume_point, Geometry, RepositoryReader, SegmentRead};
use addb_storage::BlockStore;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of slots checked.
    pub segments_checked: u64,
    /// Number of consistent segments.
    pub valid_segments: u64,
    /// Number of records checked, when frames are checked.
    pub records_checked: u64,
    /// List of problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Returns true if no problem was found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, segment_size: Option<u64>, check_frames: bool) -> CommandResult<()> {
    println!("Verifying repository at {:?}", path);
    println!();

    let store = open_repository(path)?;
    let Some(geometry) = repository_geometry(&store, segment_size)? else {
        println!("Repository is empty");
        println!();
        println!("✓ Repository verification passed");
        return Ok(());
    };

    let result = verify(&store, geometry, check_frames)?;
    print_result(&result, check_frames);

    println!();
    if result.is_ok() {
        println!("✓ Repository verification passed");
        Ok(())
    } else {
        println!("✗ Repository verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every slot of `store` laid out as `geometry`.
///
/// Torn and malformed segments are errors, as is a first header the sink
/// would refuse. With `check_frames`, every consistent segment must also
/// hold exactly its declared number of length-prefixed frames.
pub fn verify(
    store: &dyn BlockStore,
    geometry: Geometry,
    check_frames: bool,
) -> CommandResult<VerifyResult> {
    let mut result = VerifyResult::default();
    let mut reader = RepositoryReader::new(store, geometry);

    for item in reader.segments() {
        let (index, read) = item?;
        result.segments_checked += 1;
        match read {
            SegmentRead::Empty => {}
            SegmentRead::Torn { header, trailer } => result.errors.push(format!(
                "{} is torn: header {}, trailer {}",
                index, header.seq_nr, trailer.seq_nr
            )),
            SegmentRead::Malformed { reason } => {
                result.errors.push(format!("{} is malformed: {}", index, reason));
            }
            SegmentRead::Valid(view) => {
                result.valid_segments += 1;
                if check_frames {
                    for (n, record) in view.framed_records().enumerate() {
                        match record {
                            Ok(_) => result.records_checked += 1,
                            Err(err) => {
                                result.errors.push(format!(
                                    "{} record {} of {}: {}",
                                    index,
                                    n,
                                    view.record_count(),
                                    err
                                ));
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    if let Err(err) = locate_resume_point(store, geometry) {
        result.errors.push(format!("repository cannot be resumed: {}", err));
    }
    Ok(result)
}

fn print_result(result: &VerifyResult, check_frames: bool) {
    println!("Segments checked: {}", result.segments_checked);
    println!("Valid segments: {}", result.valid_segments);
    if check_frames {
        println!("Records checked: {}", result.records_checked);
    }
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!("  - {}", error);
        }
    }
}
