//! Upload worker pool
//!
//! A fixed number of tokio tasks share one bounded queue of [`SyncJob`]s.
//! Each worker uploads one file at a time and retries it according to the
//! pool's [`RetryPolicy`] before moving on.
//!
//! ## Flow
//!
//! ```text
//! SyncOrchestrator ──push──→ JobQueue ──→ mpsc (bounded) ──→ worker 1..N ──→ IFileTransfer
//!                                                                  │
//!                                                             PoolSummary
//! ```
//!
//! The queue capacity is the backpressure: [`JobQueue::push`] waits while
//! the queue is full, so at most `workers + queue_depth` files are in flight
//! or waiting at any time.

use std::sync::Arc;

use drivemirror_core::domain::{RemotePath, SyncJob};
use drivemirror_core::ports::{IFileTransfer, UploadOutcome};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::report::format_bytes;
use crate::retry::RetryPolicy;
use crate::SyncError;

/// Sending half of the job queue
///
/// Dropping or [closing](JobQueue::close) it lets the workers drain the
/// remaining jobs and exit.
#[derive(Debug)]
pub struct JobQueue {
    sender: mpsc::Sender<SyncJob>,
    cancel: CancellationToken,
}

impl JobQueue {
    /// Enqueues a job, waiting for capacity
    ///
    /// # Errors
    /// [`SyncError::Cancelled`] if the pool was cancelled or every worker
    /// has exited.
    pub async fn push(&self, job: SyncJob) -> Result<(), SyncError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            sent = self.sender.send(job) => sent.map_err(|_| SyncError::Cancelled),
        }
    }

    /// Closes the queue; no more jobs can be pushed
    pub fn close(self) {
        debug!("Closing job queue");
    }
}

/// Totals reported by [`WorkerPool::join`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub uploaded: u64,
    pub failed: u64,
    /// Jobs dropped because the pool was cancelled
    pub cancelled: u64,
    pub bytes_uploaded: u64,
    /// Session resumes across all successful uploads
    pub resumes: u64,
    /// `(destination path, last error)` per failed job
    pub failures: Vec<(RemotePath, String)>,
}

impl PoolSummary {
    fn merge(&mut self, other: PoolSummary) {
        self.uploaded += other.uploaded;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.bytes_uploaded += other.bytes_uploaded;
        self.resumes += other.resumes;
        self.failures.extend(other.failures);
    }
}

/// Handle to the running workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<PoolSummary>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawns `workers` upload tasks and returns the pool with its queue
    ///
    /// `workers` and `queue_depth` are raised to 1 if zero. The pool stops
    /// when `cancel` fires or when the queue is closed and drained.
    pub fn start(
        workers: usize,
        queue_depth: usize,
        transfer: Arc<dyn IFileTransfer>,
        retry_policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> (Self, JobQueue) {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        info!(workers, queue_depth, "Starting upload workers");

        let handles = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    receiver: Arc::clone(&receiver),
                    transfer: Arc::clone(&transfer),
                    retry_policy,
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let queue = JobQueue {
            sender,
            cancel: cancel.clone(),
        };
        (Self { handles, cancel }, queue)
    }

    /// Stops workers at their next dequeue, upload, or retry sleep
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for every worker to exit and sums their results
    pub async fn join(self) -> PoolSummary {
        let mut summary = PoolSummary::default();
        for handle in self.handles {
            match handle.await {
                Ok(worker_summary) => summary.merge(worker_summary),
                Err(e) => error!(error = %e, "Upload worker task failed"),
            }
        }
        debug!(
            uploaded = summary.uploaded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Upload workers finished"
        );
        summary
    }
}

/// Result of working one job to completion
enum JobResult {
    Done(UploadOutcome),
    Failed(String),
    Cancelled,
}

struct Worker {
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<SyncJob>>>,
    transfer: Arc<dyn IFileTransfer>,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> PoolSummary {
        let mut summary = PoolSummary::default();

        while let Some(job) = self.next_job().await {
            let destination = job.destination_path();
            match self.process(&job).await {
                JobResult::Done(outcome) => {
                    summary.uploaded += 1;
                    if let UploadOutcome::Uploaded { bytes, resumes } = outcome {
                        summary.bytes_uploaded += bytes;
                        summary.resumes += u64::from(resumes);
                    }
                }
                JobResult::Failed(reason) => {
                    summary.failed += 1;
                    summary.failures.push((destination, reason));
                }
                JobResult::Cancelled => {
                    summary.cancelled += 1;
                    break;
                }
            }
        }

        debug!(worker = self.id, "Upload worker exiting");
        summary
    }

    /// Takes the next job, or `None` once the queue is closed and empty
    /// or the pool is cancelled
    async fn next_job(&self) -> Option<SyncJob> {
        let mut receiver = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            receiver = self.receiver.lock() => receiver,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            job = receiver.recv() => job,
        }
    }

    async fn process(&self, job: &SyncJob) -> JobResult {
        let destination = job.destination_path();
        let mut failed_attempts: u32 = 0;

        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return JobResult::Cancelled,
                attempt = self.transfer.upload_file(job) => attempt,
            };

            let err = match attempt {
                Ok(outcome) => {
                    if failed_attempts > 0 {
                        info!(
                            path = %destination,
                            attempts = failed_attempts + 1,
                            "Upload succeeded after retry"
                        );
                    }
                    return JobResult::Done(outcome);
                }
                Err(err) => err,
            };

            failed_attempts += 1;
            let Some(delay) = self.retry_policy.next_delay(failed_attempts) else {
                error!(
                    worker = self.id,
                    path = %destination,
                    size = %format_bytes(job.file.size),
                    attempts = failed_attempts,
                    error = %format!("{err:#}"),
                    "Giving up on file"
                );
                return JobResult::Failed(format!("{err:#}"));
            };

            warn!(
                worker = self.id,
                path = %destination,
                attempt = failed_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %format!("{err:#}"),
                "Upload failed, retrying"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return JobResult::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
