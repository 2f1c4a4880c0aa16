//! One-level directory scanning

use crate::error::SnapshotError;
use crate::hidden::is_hidden;
use crate::snapshot::{DirectoryEntry, Snapshot};
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Snapshot the immediate children of `dir`
///
/// Hidden children are skipped. Any I/O failure during enumeration fails the
/// whole snapshot; a partial listing is never returned.
pub fn snapshot(dir: &Path) -> Result<Snapshot, SnapshotError> {
    let read_dir = fs::read_dir(dir).map_err(|source| SnapshotError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();

    for item in read_dir {
        let item = item.map_err(|source| SnapshotError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let name = item.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }

        let metadata = stat(&item.path())?;
        let modified_at_ms = metadata.modified().map(unix_millis).unwrap_or(0);

        entries.push(DirectoryEntry::new(
            name,
            metadata.len(),
            metadata.is_dir(),
            modified_at_ms,
        ));
    }

    debug!("Snapshot of {} has {} entries", dir.display(), entries.len());

    Ok(Snapshot::from_entries(entries))
}

/// Stat a child, following symlinks
///
/// A dangling symlink is described by the link itself. A child that no longer
/// exists at all is an error.
fn stat(path: &Path) -> Result<Metadata, SnapshotError> {
    let to_error = |source| SnapshotError::Stat {
        path: path.to_path_buf(),
        source,
    };

    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::symlink_metadata(path).map_err(to_error)
        }
        Err(e) => Err(to_error(e)),
    }
}

/// Milliseconds since the Unix epoch (negative before it)
pub fn unix_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
