//! Snapshot failure taxonomy

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A directory could not be enumerated
///
/// Callers treat every variant the same way: nothing is published and the
/// last good snapshot stands.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The directory itself could not be opened or iterated
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A child disappeared or could not be stat'ed mid-scan
    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SnapshotError {
    /// Path the failing operation was applied to
    pub fn path(&self) -> &PathBuf {
        match self {
            SnapshotError::ReadDir { path, .. } | SnapshotError::Stat { path, .. } => path,
        }
    }
}
