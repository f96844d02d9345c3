//! Cloud drive port (driven/secondary port)
//!
//! This module defines the interface the sync orchestrator uses to read
//! folder listings and prepare destination folders. The implementation
//! targets OneDrive, but nothing here is provider-specific.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and the orchestrator only needs to know "failed" plus a message.
//! - Uses `#[async_trait]` for async trait methods.
//! - Listing errors and empty listings are treated alike by callers; an
//!   implementation should not paper over errors by returning `Ok(vec![])`.

use crate::domain::item::RemoteItem;
use crate::domain::newtypes::RemotePath;

/// Port trait for one authenticated drive account
#[async_trait::async_trait]
pub trait ICloudDrive: Send + Sync {
    /// Short label for status lines (e.g. `"source"`)
    fn account(&self) -> &str;

    /// Lists every child of `path`, following pagination, in provider order
    ///
    /// # Errors
    /// Returns an error if the folder cannot be listed (missing, denied,
    /// network failure or malformed response)
    async fn list_children(&self, path: &RemotePath) -> anyhow::Result<Vec<RemoteItem>>;

    /// Ensures every segment of `path` exists as a folder
    ///
    /// Segments that already exist as folders are left alone. Creation uses
    /// a "fail on conflict" policy and never renames or replaces.
    ///
    /// # Errors
    /// Returns an error if any segment could not be confirmed or created;
    /// callers must not upload below `path` in that case
    async fn ensure_folder(&self, path: &RemotePath) -> anyhow::Result<()>;
}
