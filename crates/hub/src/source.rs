//! Where snapshots come from

use async_trait::async_trait;
use fc_core::{Snapshot, SnapshotError};
use std::io;
use std::path::Path;

/// Produces snapshots of the watch root
///
/// The hub only ever talks to this seam, so tests can swap the file system
/// for failing or slow sources.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self, root: &Path) -> Result<Snapshot, SnapshotError>;
}

/// Reads snapshots from disk on the blocking thread pool
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSnapshotter;

#[async_trait]
impl SnapshotSource for DiskSnapshotter {
    async fn snapshot(&self, root: &Path) -> Result<Snapshot, SnapshotError> {
        let dir = root.to_path_buf();
        match tokio::task::spawn_blocking(move || fc_core::snapshot(&dir)).await {
            Ok(result) => result,
            Err(e) => Err(SnapshotError::ReadDir {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            }),
        }
    }
}
