//! Upload jobs produced by the tree differ

use super::item::RemoteFile;
use super::newtypes::RemotePath;

/// One queued file upload
///
/// Created by the orchestrator and consumed by exactly one worker. The job
/// is never mutated after construction; retries reuse the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    /// The source file as listed
    pub file: RemoteFile,
    /// Drive-relative path of the source file on the source account
    pub source_path: RemotePath,
    /// Destination folder the file is uploaded into
    pub destination_folder: RemotePath,
    /// Label of the destination account, for status lines
    pub destination_account: String,
}

impl SyncJob {
    /// Destination path of the uploaded file
    ///
    /// Falls back to the folder itself if the file name is not a valid
    /// path component, which the listing never produces.
    #[must_use]
    pub fn destination_path(&self) -> RemotePath {
        self.destination_folder
            .join(&self.file.name)
            .unwrap_or_else(|_| self.destination_folder.clone())
    }
}
