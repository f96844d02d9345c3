//! DriveMirror Sync - one-way mirroring engine
//!
//! Provides:
//! - Tree diffing by name, size and content hash
//! - A recursive orchestrator that walks the source tree serially
//! - A bounded worker pool that uploads queued files with per-file retry
//!
//! ## Modules
//!
//! - [`differ`] - Decides whether a source file already exists at the destination
//! - [`orchestrator`] - Walks source folders and feeds the job queue
//! - [`pool`] - Upload workers, the bounded job queue and the pool summary
//! - [`retry`] - Retry policy and backoff schedules
//! - [`report`] - Run summary and human-readable sizes

pub mod differ;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod retry;

use drivemirror_core::domain::RemotePath;
use thiserror::Error;

pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use report::{format_bytes, SyncReport};
pub use retry::{Backoff, RetryPolicy};

/// Errors that abort a sync run
#[derive(Debug, Error)]
pub enum SyncError {
    /// A destination folder could not be confirmed or created
    #[error("Failed to prepare destination folder {path}: {cause:#}")]
    DestinationSetup {
        path: RemotePath,
        cause: anyhow::Error,
    },

    /// The run was cancelled before the traversal finished
    #[error("Sync was cancelled")]
    Cancelled,
}
