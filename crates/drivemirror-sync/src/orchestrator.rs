//! Sync orchestrator
//!
//! Walks the source tree one folder at a time, in listing order. For every
//! folder it makes sure the destination counterpart exists, lists it once,
//! and diffs each source file against that listing. Files that need copying
//! are pushed onto the worker pool's queue; subfolders are recursed into
//! inline.
//!
//! ## Ownership
//!
//! [`SyncOrchestrator::run`] owns the [`WorkerPool`]: it starts it, closes
//! the queue after the traversal, and joins the workers. The recursive
//! [`SyncOrchestrator::sync_folder`] only borrows the [`JobQueue`].
//!
//! ## Failure handling
//!
//! - A listing that fails is treated as empty and counted in
//!   [`SyncReport::listing_errors`].
//! - A destination folder that cannot be prepared aborts the whole run: the
//!   pool is cancelled and [`SyncError::DestinationSetup`] is returned.
//! - Individual file failures are retried by the pool and reported in
//!   [`SyncReport::failures`].

use std::sync::Arc;
use std::time::Instant;

use drivemirror_core::config::{RetryConfig, SyncConfig};
use drivemirror_core::domain::{RemoteItem, RemotePath, SyncJob};
use drivemirror_core::ports::{ICloudDrive, IFileTransfer};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::differ::{DestinationIndex, DiffDecision};
use crate::pool::{JobQueue, WorkerPool};
use crate::report::{format_bytes, SyncReport};
use crate::retry::RetryPolicy;
use crate::SyncError;

/// Pool sizing and retry behaviour for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub workers: usize,
    pub queue_depth: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_depth: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(sync: &SyncConfig, retry: &RetryConfig) -> Self {
        Self {
            workers: sync.workers,
            queue_depth: sync.queue_depth,
            retry: RetryPolicy::from(retry),
        }
    }
}

/// Mirrors one folder tree from a source drive to a destination drive
pub struct SyncOrchestrator {
    source: Arc<dyn ICloudDrive>,
    destination: Arc<dyn ICloudDrive>,
    transfer: Arc<dyn IFileTransfer>,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn ICloudDrive>,
        destination: Arc<dyn ICloudDrive>,
        transfer: Arc<dyn IFileTransfer>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            destination,
            transfer,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to stop the run from outside, e.g. on Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Mirrors `source_root` into `destination_root`
    ///
    /// Returns once every enqueued file has been uploaded or has exhausted
    /// its retries.
    ///
    /// # Errors
    /// - [`SyncError::DestinationSetup`] if a destination folder could not be
    ///   prepared
    /// - [`SyncError::Cancelled`] if the run was cancelled
    pub async fn run(
        &self,
        source_root: &RemotePath,
        destination_root: &RemotePath,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        info!(
            source = %source_root,
            source_account = self.source.account(),
            destination = %destination_root,
            destination_account = self.destination.account(),
            "Starting sync"
        );

        let mut report = SyncReport::default();
        let children = self
            .list_or_empty(self.source.as_ref(), source_root, &mut report)
            .await;
        if children.is_empty() {
            info!(source = %source_root, "Source folder is empty, nothing to sync");
            return Ok(report);
        }

        let (pool, queue) = WorkerPool::start(
            self.options.workers,
            self.options.queue_depth,
            Arc::clone(&self.transfer),
            self.options.retry,
            self.cancel.child_token(),
        );

        let traversal = self
            .sync_children(source_root, destination_root, children, &queue, &mut report)
            .await;
        queue.close();

        if let Err(e) = traversal {
            error!(error = %e, "Sync aborted");
            pool.cancel();
            pool.join().await;
            return Err(e);
        }

        let summary = pool.join().await;
        if self.cancel.is_cancelled() {
            warn!(
                uploaded = summary.uploaded,
                cancelled = summary.cancelled,
                "Sync cancelled"
            );
            return Err(SyncError::Cancelled);
        }

        report.uploaded = summary.uploaded;
        report.failed = summary.failed;
        report.bytes_uploaded = summary.bytes_uploaded;
        report.resumes = summary.resumes;
        report.failures = summary.failures;

        info!(
            skipped = report.skipped,
            enqueued = report.enqueued,
            uploaded = report.uploaded,
            failed = report.failed,
            listing_errors = report.listing_errors,
            transferred = %format_bytes(report.bytes_uploaded),
            resumes = report.resumes,
            duration_ms = started.elapsed().as_millis() as u64,
            "Sync complete"
        );
        Ok(report)
    }

    /// Mirrors one folder and everything below it onto `queue`
    ///
    /// An empty (or unlistable) source folder is skipped without touching
    /// the destination.
    pub fn sync_folder<'a>(
        &'a self,
        src: &'a RemotePath,
        dst: &'a RemotePath,
        queue: &'a JobQueue,
        report: &'a mut SyncReport,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let children = self
                .list_or_empty(self.source.as_ref(), src, report)
                .await;
            if children.is_empty() {
                debug!(path = %src, "Empty source folder");
                return Ok(());
            }

            self.sync_children(src, dst, children, queue, report).await
        })
    }

    async fn sync_children(
        &self,
        src: &RemotePath,
        dst: &RemotePath,
        children: Vec<RemoteItem>,
        queue: &JobQueue,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if let Err(cause) = self.destination.ensure_folder(dst).await {
            error!(path = %dst, error = %format!("{cause:#}"), "Cannot prepare destination folder");
            return Err(SyncError::DestinationSetup {
                path: dst.clone(),
                cause,
            });
        }

        let existing = self
            .list_or_empty(self.destination.as_ref(), dst, report)
            .await;
        let index = DestinationIndex::new(&existing);

        debug!(
            source = %src,
            destination = %dst,
            source_items = children.len(),
            destination_items = existing.len(),
            "Diffing folder"
        );

        for child in children {
            let name = child.name().to_string();
            let (child_src, child_dst) = match (src.join(&name), dst.join(&name)) {
                (Ok(s), Ok(d)) => (s, d),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(folder = %src, name = %name, error = %e, "Skipping item with unusable name");
                    continue;
                }
            };

            match child {
                RemoteItem::Folder(_) => {
                    self.sync_folder(&child_src, &child_dst, queue, report)
                        .await?;
                }
                RemoteItem::File(file) => match index.decide(&file) {
                    DiffDecision::AlreadySynced => {
                        info!(
                            name = %file.name,
                            size = %format_bytes(file.size),
                            "Already synced"
                        );
                        report.skipped += 1;
                    }
                    DiffDecision::Upload(reason) => {
                        debug!(path = %child_src, ?reason, "Queueing upload");
                        let job = SyncJob {
                            file,
                            source_path: child_src,
                            destination_folder: dst.clone(),
                            destination_account: self.destination.account().to_string(),
                        };
                        queue.push(job).await?;
                        report.enqueued += 1;
                    }
                },
            }
        }

        Ok(())
    }

    async fn list_or_empty(
        &self,
        drive: &dyn ICloudDrive,
        path: &RemotePath,
        report: &mut SyncReport,
    ) -> Vec<RemoteItem> {
        match drive.list_children(path).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    account = drive.account(),
                    path = %path,
                    error = %format!("{e:#}"),
                    "Listing failed, treating folder as empty"
                );
                report.listing_errors += 1;
                Vec::new()
            }
        }
    }
}
