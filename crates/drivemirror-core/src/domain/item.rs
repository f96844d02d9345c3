//! Remote drive items
//!
//! A [`RemoteItem`] is one entry of a folder listing. The provider marks
//! folders with a `folder.childCount` facet and nothing else, so the adapter
//! decides the variant from that facet when it parses a listing.
//!
//! Items are rebuilt on every listing call and are never cached.

use serde::{Deserialize, Serialize};

/// One listed entry, either a file or a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteItem {
    File(RemoteFile),
    Folder(RemoteFolder),
}

impl RemoteItem {
    /// Leaf name of the item
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => &f.name,
            Self::Folder(f) => &f.name,
        }
    }

    /// Parent path exactly as reported by the provider
    #[must_use]
    pub fn parent_path(&self) -> Option<&str> {
        match self {
            Self::File(f) => f.parent_path.as_deref(),
            Self::Folder(f) => f.parent_path.as_deref(),
        }
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }

    /// Returns the file payload, or `None` for folders
    #[must_use]
    pub fn as_file(&self) -> Option<&RemoteFile> {
        match self {
            Self::File(f) => Some(f),
            Self::Folder(_) => None,
        }
    }
}

/// A file entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Leaf name (unique among siblings at listing time)
    pub name: String,
    /// Size in bytes; zero-byte files are valid
    pub size: u64,
    /// Parent path as reported by the provider (e.g. `/drive/root:/Photos`)
    pub parent_path: Option<String>,
    /// Pre-authenticated, time-limited content URL
    ///
    /// Only valid until the provider expires it; never persist it.
    pub download_url: Option<String>,
    /// Content digests, when the provider reports them
    pub hashes: FileHashes,
}

/// A folder entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    /// Leaf name (unique among siblings at listing time)
    pub name: String,
    /// Number of immediate children
    pub child_count: u64,
    /// Parent path as reported by the provider
    pub parent_path: Option<String>,
}

/// Content hashes reported for a file
///
/// Personal drives report SHA-1, business drives report QuickXorHash;
/// either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashes {
    pub sha1: Option<String>,
    pub quick_xor: Option<String>,
}

/// Outcome of comparing two sets of [`FileHashes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashComparison {
    /// A hash kind present on both sides has the same value
    Match,
    /// A hash kind present on both sides differs
    Mismatch,
    /// No hash kind is present on both sides
    Unavailable,
}

impl FileHashes {
    /// Compares against another set of hashes
    ///
    /// SHA-1 is preferred over QuickXorHash when both sides carry it.
    /// Hex digests are compared case-insensitively.
    #[must_use]
    pub fn compare(&self, other: &FileHashes) -> HashComparison {
        if let (Some(a), Some(b)) = (non_empty(&self.sha1), non_empty(&other.sha1)) {
            return if a.eq_ignore_ascii_case(b) {
                HashComparison::Match
            } else {
                HashComparison::Mismatch
            };
        }

        if let (Some(a), Some(b)) = (non_empty(&self.quick_xor), non_empty(&other.quick_xor)) {
            // Base64, so case matters
            return if a == b {
                HashComparison::Match
            } else {
                HashComparison::Mismatch
            };
        }

        HashComparison::Unavailable
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
