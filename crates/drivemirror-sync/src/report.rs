//! Run summary

use drivemirror_core::domain::RemotePath;
pub use drivemirror_core::format::format_bytes;

/// Counts collected over one [`SyncOrchestrator::run`](crate::SyncOrchestrator::run)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files found already present at the destination
    pub skipped: u64,
    /// Files handed to the worker pool
    pub enqueued: u64,
    /// Files uploaded successfully
    pub uploaded: u64,
    /// Files that exhausted their retry budget
    pub failed: u64,
    /// Destination listings that failed and were treated as empty
    pub listing_errors: u64,
    /// Bytes sent for successful uploads
    pub bytes_uploaded: u64,
    /// Upload session resumes needed by successful uploads
    pub resumes: u64,
    /// `(destination path, last error)` for every failed file
    pub failures: Vec<(RemotePath, String)>,
}

impl SyncReport {
    /// Whether every enqueued file made it to the destination
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
