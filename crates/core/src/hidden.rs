//! Hidden entry policy
//!
//! Names starting with `.` are hidden. They never show up in a snapshot and
//! changes underneath them never trigger a recomputation.

use std::path::{Component, Path};

/// Leading character that marks an entry as hidden
pub const HIDDEN_MARKER: char = '.';

/// Check a single file name
pub fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_MARKER)
}

/// Check whether `path` lives at or below a hidden entry of `root`
///
/// Only components below `root` are considered, so watching a directory that
/// itself sits inside a dot-directory still works. Paths outside `root` are
/// judged on all of their components.
pub fn path_is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);

    relative.components().any(|component| match component {
        Component::Normal(name) => is_hidden(&name.to_string_lossy()),
        _ => false,
    })
}
