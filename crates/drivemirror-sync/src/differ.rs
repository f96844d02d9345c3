//! Tree differ
//!
//! Decides, per source file, whether the destination folder already holds
//! the same file. A destination entry matches when it is a file with the
//! same name and size. When both sides report a comparable content hash the
//! hash decides; when either side has none, name and size are trusted.

use std::collections::HashMap;

use drivemirror_core::domain::{HashComparison, RemoteFile, RemoteItem};

/// Why a file is being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
    /// No file with this name exists at the destination
    Missing,
    /// A file with this name exists but its size differs
    SizeChanged,
    /// Name and size match but the content hashes differ
    HashMismatch,
}

/// Outcome of comparing one source file against the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffDecision {
    AlreadySynced,
    Upload(UploadReason),
}

/// Destination files of one folder, indexed by name
///
/// Folders are ignored: a folder never satisfies a file.
#[derive(Debug, Default)]
pub struct DestinationIndex<'a> {
    files: HashMap<&'a str, Vec<&'a RemoteFile>>,
}

impl<'a> DestinationIndex<'a> {
    pub fn new(items: &'a [RemoteItem]) -> Self {
        let mut files: HashMap<&'a str, Vec<&'a RemoteFile>> = HashMap::new();
        for file in items.iter().filter_map(RemoteItem::as_file) {
            files.entry(file.name.as_str()).or_default().push(file);
        }
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Compares `source` with the destination entries of the same name
    pub fn decide(&self, source: &RemoteFile) -> DiffDecision {
        let Some(candidates) = self.files.get(source.name.as_str()) else {
            return DiffDecision::Upload(UploadReason::Missing);
        };

        let mut size_matched = false;
        for candidate in candidates.iter().filter(|c| c.size == source.size) {
            size_matched = true;
            match source.hashes.compare(&candidate.hashes) {
                HashComparison::Match | HashComparison::Unavailable => {
                    return DiffDecision::AlreadySynced
                }
                HashComparison::Mismatch => {}
            }
        }

        if size_matched {
            DiffDecision::Upload(UploadReason::HashMismatch)
        } else {
            DiffDecision::Upload(UploadReason::SizeChanged)
        }
    }
}
