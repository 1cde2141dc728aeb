//! CLI command implementations.

pub mod inspect;
pub mod verify;

use addb_core::{probe_segment_size, Geometry};
use addb_storage::{BlockStore, FileStore};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Result type of every command.
pub type CommandResult<T> = Result<T, Box<dyn Error>>;

/// Output format of reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown output format '{}' (expected text or json)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Opens a repository file for byte-granular reads.
pub fn open_repository(path: &Path) -> CommandResult<FileStore> {
    if !path.is_file() {
        return Err(format!("No repository found at {:?}", path).into());
    }
    Ok(FileStore::open_with_block_shift(path, 0)?)
}

/// Returns the layout to read `store` with: the given segment size, or the
/// one recorded in the first header, over the whole file.
///
/// Returns `None` for a repository that was never written.
pub fn repository_geometry(
    store: &dyn BlockStore,
    segment_size: Option<u64>,
) -> CommandResult<Option<Geometry>> {
    let segment_size = match segment_size {
        Some(size) => size,
        None => match probe_segment_size(store)? {
            Some(size) => size,
            None => return Ok(None),
        },
    };
    let size = store.size()?.max(segment_size);
    let geometry = Geometry::new(segment_size, size)?;
    debug!(
        segment_size,
        segments = geometry.segment_count(),
        "Reading repository"
    );
    Ok(Some(geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use addb_testkit::{write_segment, TempRepository};

    #[test]
    fn output_format_parses() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn missing_repository_is_reported() {
        let repo = TempRepository::new();
        let err = open_repository(repo.path()).unwrap_err();
        assert!(err.to_string().contains("No repository found"));
    }

    #[test]
    fn geometry_comes_from_first_header() {
        let repo = TempRepository::new();
        let store = repo.open(0);
        let written = Geometry::new(512, 512 * 3).unwrap();
        write_segment(store.as_ref(), written, 0, 1, &[b"x"]);
        write_segment(store.as_ref(), written, 2, 3, &[]);

        let geometry = repository_geometry(store.as_ref(), None).unwrap().unwrap();
        assert_eq!(geometry.segment_size(), 512);
        assert_eq!(geometry.segment_count(), 3);

        let forced = repository_geometry(store.as_ref(), Some(256)).unwrap().unwrap();
        assert_eq!(forced.segment_count(), 6);
    }

    #[test]
    fn empty_repository_has_no_geometry() {
        let repo = TempRepository::new();
        let store = repo.open(0);
        assert!(repository_geometry(store.as_ref(), None).unwrap().is_none());
    }
}
