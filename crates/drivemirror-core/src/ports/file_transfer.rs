//! File transfer port
//!
//! The worker pool hands each [`SyncJob`] to an [`IFileTransfer`]. The
//! adapter copies the source file into the destination folder and reports
//! how it went; retry decisions stay with the pool.

use crate::domain::job::SyncJob;

/// Successful result of transferring one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Content was streamed through a resumable upload session
    Uploaded {
        /// Total bytes committed by the destination
        bytes: u64,
        /// Number of resumes needed along the way
        resumes: u32,
    },
    /// A zero-byte file was created without an upload session
    CreatedEmpty,
}

/// Port trait for copying one file between accounts
#[async_trait::async_trait]
pub trait IFileTransfer: Send + Sync {
    /// Copies `job.file` into `job.destination_folder`
    ///
    /// # Errors
    /// Returns an error if the file could not be transferred in this
    /// attempt; the caller decides whether to retry
    async fn upload_file(&self, job: &SyncJob) -> anyhow::Result<UploadOutcome>;
}
