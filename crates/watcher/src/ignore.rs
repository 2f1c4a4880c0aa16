//! Raw event filtering
//!
//! Decides which backend events count as a change of the watched tree:
//! 1. Rescan requests (queue overflow) always count
//! 2. Access and "other" events never count
//! 3. Create / modify / remove count unless every path is hidden

use fc_core::path_is_hidden;
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

/// Filter applied to every raw event before it reaches the debouncer
#[derive(Debug, Clone)]
pub struct EventFilter {
    root: PathBuf,
}

impl EventFilter {
    /// Create a filter for events under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Check if an event should trigger a recomputation
    pub fn qualifies(&self, event: &Event) -> bool {
        if event.need_rescan() {
            return true;
        }

        if !kind_qualifies(&event.kind) {
            return false;
        }

        // Some backends report coarse events without paths
        if event.paths.is_empty() {
            return true;
        }

        event
            .paths
            .iter()
            .any(|path| !path_is_hidden(&self.root, path))
    }

    /// Root the filter judges paths against
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Created, modified (data, metadata or name) and removed entries count
fn kind_qualifies(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
