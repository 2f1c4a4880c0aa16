//! Directory listing primitives for Filecast
//!
//! This crate provides:
//! - `DirectoryEntry` / `Snapshot` value types (wire-ready via serde)
//! - One-level, deterministic directory snapshots
//! - The hidden-entry policy shared with the watcher

pub mod error;
pub mod hidden;
pub mod scan;
pub mod snapshot;

// Re-exports
pub use error::SnapshotError;
pub use hidden::{is_hidden, path_is_hidden, HIDDEN_MARKER};
pub use scan::snapshot;
pub use snapshot::{DirectoryEntry, Snapshot};
