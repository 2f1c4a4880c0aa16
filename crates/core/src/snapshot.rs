//! Snapshot representation of one directory level

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// One child of a snapshotted directory
///
/// Serializes to the `{name, size, isDirectory, mtime}` record that clients
/// receive, with `mtime` in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectoryEntry {
    name: String,
    size: u64,
    #[serde(rename = "isDirectory")]
    is_directory: bool,
    #[serde(rename = "mtime")]
    modified_at_ms: i64,
}

impl DirectoryEntry {
    /// Create a new entry
    pub fn new(name: impl Into<String>, size: u64, is_directory: bool, modified_at_ms: i64) -> Self {
        Self {
            name: name.into(),
            size,
            is_directory,
            modified_at_ms,
        }
    }

    /// Create a regular (non-directory) entry
    pub fn file(name: impl Into<String>, size: u64, modified_at_ms: i64) -> Self {
        Self::new(name, size, false, modified_at_ms)
    }

    /// Create a directory entry
    pub fn directory(name: impl Into<String>, size: u64, modified_at_ms: i64) -> Self {
        Self::new(name, size, true, modified_at_ms)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Modification time in milliseconds since the Unix epoch
    pub fn modified_at_ms(&self) -> i64 {
        self.modified_at_ms
    }
}

impl Ord for DirectoryEntry {
    /// Directories first, then names byte-wise
    ///
    /// Size and mtime only break ties between equal names, which keeps the
    /// order total over values.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .is_directory
            .cmp(&self.is_directory)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.size.cmp(&other.size))
            .then_with(|| self.modified_at_ms.cmp(&other.modified_at_ms))
    }
}

impl PartialOrd for DirectoryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Full, sorted listing of a directory's immediate children
///
/// Every recomputation produces a fresh snapshot that replaces the previous
/// one wholesale. Serializes as a bare JSON array of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: Vec<DirectoryEntry>,
}

impl Snapshot {
    /// Build a snapshot, putting the entries into presentation order
    pub fn from_entries(mut entries: Vec<DirectoryEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Entries in presentation order
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DirectoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by name
    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}

/// Parsed entries go through `from_entries`, so the order holds for any input
impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<DirectoryEntry>::deserialize(deserializer).map(Snapshot::from_entries)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a DirectoryEntry;
    type IntoIter = std::slice::Iter<'a, DirectoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
