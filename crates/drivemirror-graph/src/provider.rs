//! Port implementations backed by the drive API
//!
//! - [`GraphDrive`] implements [`ICloudDrive`] for one account by delegating
//!   to the [`listing`] and [`folders`] modules.
//! - [`GraphTransfer`] implements [`IFileTransfer`] by delegating to
//!   [`GraphTransfer::upload`].
//!
//! ## Design Notes
//!
//! - Typed errors ([`GraphError`], [`FolderError`], [`UploadError`]) are
//!   converted to `anyhow::Error` at this boundary; the sync engine only logs
//!   them and decides on retries.
//!
//! [`GraphError`]: crate::GraphError
//! [`FolderError`]: crate::folders::FolderError
//! [`UploadError`]: crate::upload::UploadError

use anyhow::{Context, Result};
use tracing::debug;

use drivemirror_core::domain::{RemoteItem, RemotePath, SyncJob};
use drivemirror_core::ports::{ICloudDrive, IFileTransfer, UploadOutcome};

use crate::client::GraphClient;
use crate::upload::GraphTransfer;
use crate::{folders, listing};

/// One drive account seen through the [`ICloudDrive`] port
#[derive(Debug, Clone)]
pub struct GraphDrive {
    /// Label used in status lines, e.g. `"source"`
    account: String,
    client: GraphClient,
}

impl GraphDrive {
    pub fn new(account: impl Into<String>, client: GraphClient) -> Self {
        Self {
            account: account.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl ICloudDrive for GraphDrive {
    fn account(&self) -> &str {
        &self.account
    }

    async fn list_children(&self, path: &RemotePath) -> Result<Vec<RemoteItem>> {
        debug!(account = %self.account, path = %path, "GraphDrive::list_children");
        listing::list_children(&self.client, path)
            .await
            .with_context(|| format!("Failed to list {} on {}", path, self.account))
    }

    async fn ensure_folder(&self, path: &RemotePath) -> Result<()> {
        debug!(account = %self.account, path = %path, "GraphDrive::ensure_folder");
        folders::ensure_folder(&self.client, path)
            .await
            .with_context(|| format!("Failed to prepare {} on {}", path, self.account))
    }
}

#[async_trait::async_trait]
impl IFileTransfer for GraphTransfer {
    async fn upload_file(&self, job: &SyncJob) -> Result<UploadOutcome> {
        Ok(self.upload(job).await?)
    }
}
