//! Upload session manager
//!
//! Copies one file from the source account to the destination account
//! without touching local disk:
//!
//! 1. Open a GET stream on the source content
//! 2. Create an upload session on the destination (`upload.createSession`)
//! 3. Read fixed-size chunks from the stream and PUT each one with a
//!    `Content-Range` header
//! 4. On any chunk failure, ask the session which byte it expects next,
//!    re-open the source at that byte with a `Range` request and carry on
//!
//! Zero-byte files skip the session and are created with a simple PUT.
//!
//! ## API References
//!
//! - [Upload large files](https://learn.microsoft.com/en-us/onedrive/developer/rest-api/api/driveitem_createuploadsession)
//! - [Resume an upload](https://learn.microsoft.com/en-us/onedrive/developer/rest-api/api/driveitem_createuploadsession#resuming-an-in-progress-upload)

use std::time::Duration;

use drivemirror_core::config::TransferConfig;
use drivemirror_core::domain::{RemoteItem, RemotePath, SyncJob};
use drivemirror_core::format::format_bytes;
use drivemirror_core::ports::UploadOutcome;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{drive_path, GraphClient};
use crate::listing::get_item;
use crate::{check_status, GraphError};

/// Default chunk size: 10 MiB (32 x 320 KiB)
///
/// Upload sessions require chunk sizes that are multiples of 320 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Chunk sizes must be a multiple of this many bytes
pub const CHUNK_ALIGNMENT: usize = 320 * 1024;

// ============================================================================
// Errors
// ============================================================================

/// Reasons a single upload attempt failed
///
/// Every variant fails the file for this attempt; the worker pool decides
/// whether to try again.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The session (or the empty file) could not be created
    #[error("Failed to create upload for {path}: {source}")]
    SessionCreation {
        path: RemotePath,
        #[source]
        source: GraphError,
    },

    /// The session cannot tell us where to continue
    #[error("Upload of {path} cannot be resumed: {reason}")]
    Unresumable { path: RemotePath, reason: String },

    /// Too many consecutive resumes without a successful chunk
    #[error("Upload of {path} gave up after {attempts} consecutive resume attempts")]
    ResumeLimitExceeded { path: RemotePath, attempts: u32 },

    /// The source content could not be opened
    #[error("Source {path} is unavailable: {source}")]
    SourceUnavailable {
        path: RemotePath,
        #[source]
        source: GraphError,
    },

    /// The destination reported completion before every byte was sent
    #[error("Upload of {path} completed at {sent} of {total} bytes")]
    SizeMismatch {
        path: RemotePath,
        sent: u64,
        total: u64,
    },
}

// ============================================================================
// Settings
// ============================================================================

/// Tuning for chunked uploads
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Bytes per PUT; a multiple of [`CHUNK_ALIGNMENT`]
    pub chunk_size: usize,
    /// Consecutive resumes allowed before the file fails
    pub max_resume_attempts: u32,
    /// Deadline for one chunk PUT
    pub chunk_timeout: Duration,
    /// Deadline for each read from the source stream
    pub read_timeout: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_resume_attempts: 4,
            chunk_timeout: Duration::from_secs(300),
            read_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&TransferConfig> for TransferSettings {
    fn from(config: &TransferConfig) -> Self {
        Self {
            chunk_size: (config.chunk_size_kib * 1024) as usize,
            max_resume_attempts: config.max_resume_attempts,
            chunk_timeout: Duration::from_secs(config.chunk_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Response from `POST .../upload.createSession`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    #[serde(default)]
    upload_url: String,
}

/// Response from `GET {uploadUrl}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionStatus {
    #[serde(default)]
    next_expected_ranges: Vec<String>,
}

/// Extracts the first expected byte offset from `nextExpectedRanges`
///
/// Entries look like `"26-"` or `"26-511"`; only the start of the first
/// entry matters.
fn next_expected_offset(ranges: &[String]) -> Option<u64> {
    let first = ranges.first()?;
    let (start, _) = first.split_once('-')?;
    start.trim().parse().ok()
}

// ============================================================================
// Source stream
// ============================================================================

/// Chunked reader over a source download
///
/// Network frames rarely line up with chunk boundaries, so leftover bytes
/// are carried into the next read.
struct SourceStream {
    response: Response,
    carry: Vec<u8>,
    /// Bytes still to discard (server ignored our Range header)
    skip: u64,
    read_timeout: Duration,
}

impl SourceStream {
    fn new(response: Response, skip: u64, read_timeout: Duration) -> Self {
        Self {
            response,
            carry: Vec::new(),
            skip,
            read_timeout,
        }
    }

    /// Fills `buf` with up to `want` bytes; fewer only at end of stream
    async fn read_chunk(&mut self, buf: &mut Vec<u8>, want: usize) -> Result<(), GraphError> {
        buf.clear();

        if !self.carry.is_empty() {
            let take = want.min(self.carry.len());
            buf.extend(self.carry.drain(..take));
        }

        let read_timeout = self.read_timeout;
        while buf.len() < want {
            let frame = tokio::time::timeout(read_timeout, self.response.chunk())
                .await
                .map_err(|_| {
                    GraphError::Timeout(format!(
                        "no source data within {}s",
                        read_timeout.as_secs()
                    ))
                })??;

            let Some(frame) = frame else { break };
            let mut frame: &[u8] = &frame;

            if self.skip > 0 {
                let skipped = usize::try_from(self.skip).unwrap_or(usize::MAX).min(frame.len());
                frame = &frame[skipped..];
                self.skip -= skipped as u64;
            }

            let need = want - buf.len();
            if frame.len() <= need {
                buf.extend_from_slice(frame);
            } else {
                buf.extend_from_slice(&frame[..need]);
                self.carry.extend_from_slice(&frame[need..]);
            }
        }

        Ok(())
    }
}

// ============================================================================
// GraphTransfer
// ============================================================================

/// Result of one accepted chunk
#[derive(Debug, PartialEq, Eq)]
enum ChunkAccepted {
    /// 200/201: the destination has the whole file
    Complete,
    /// Any other status below 400
    Partial,
}

/// Why the chunk loop has to resume
#[derive(Debug, Error)]
enum ChunkFailure {
    #[error("source read failed: {0}")]
    Read(GraphError),
    #[error("source ended after {got} of {expected} bytes")]
    EarlyEof { expected: usize, got: usize },
    #[error("chunk rejected: {0}")]
    Rejected(GraphError),
    #[error("final chunk accepted but the session is still open")]
    FinalNotCommitted,
}

/// Outcome of one resume attempt
enum ResumeStep {
    Resumed { offset: u64, stream: SourceStream },
    Retry(String),
}

/// Streams files from a source account into a destination account
#[derive(Debug, Clone)]
pub struct GraphTransfer {
    source: GraphClient,
    destination: GraphClient,
    settings: TransferSettings,
}

impl GraphTransfer {
    pub fn new(source: GraphClient, destination: GraphClient, settings: TransferSettings) -> Self {
        Self {
            source,
            destination,
            settings,
        }
    }

    /// Copies `job.file` into `job.destination_folder`
    ///
    /// # Errors
    /// See [`UploadError`]. Transient chunk failures are retried internally
    /// through resume and only surface as
    /// [`UploadError::ResumeLimitExceeded`].
    pub async fn upload(&self, job: &SyncJob) -> Result<UploadOutcome, UploadError> {
        let destination = job.destination_path();
        let total = job.file.size;

        info!(
            file = %job.source_path,
            destination = %destination,
            account = %job.destination_account,
            size = total,
            "Uploading"
        );

        if total == 0 {
            self.create_empty(&destination).await?;
            info!(destination = %destination, "Uploaded empty file");
            return Ok(UploadOutcome::CreatedEmpty);
        }

        let mut stream = self
            .open_source(&self.content_url(&job.source_path), true, 0, total)
            .await
            .map_err(|source| UploadError::SourceUnavailable {
                path: job.source_path.clone(),
                source,
            })?;

        let upload_url = self.create_session(&destination).await?;

        let chunk_size = self.settings.chunk_size.max(1) as u64;
        let mut buf = Vec::with_capacity(self.settings.chunk_size);
        let mut offset: u64 = 0;
        let mut consecutive_resumes: u32 = 0;
        let mut resumes: u32 = 0;

        loop {
            let want = chunk_size.min(total - offset) as usize;
            let is_last = offset + want as u64 == total;

            let failure = match stream.read_chunk(&mut buf, want).await {
                Err(e) => ChunkFailure::Read(e),
                Ok(()) if buf.len() < want => ChunkFailure::EarlyEof {
                    expected: want,
                    got: buf.len(),
                },
                Ok(()) => match self.put_chunk(&upload_url, &buf, offset, total).await {
                    Ok(ChunkAccepted::Complete) if is_last => {
                        info!(destination = %destination, size = total, resumes, "Uploaded");
                        return Ok(UploadOutcome::Uploaded {
                            bytes: total,
                            resumes,
                        });
                    }
                    Ok(ChunkAccepted::Complete) => {
                        return Err(UploadError::SizeMismatch {
                            path: destination,
                            sent: offset + want as u64,
                            total,
                        });
                    }
                    Ok(ChunkAccepted::Partial) if !is_last => {
                        offset += want as u64;
                        consecutive_resumes = 0;
                        info!(
                            destination = %destination,
                            transferred = %format_bytes(offset),
                            total = %format_bytes(total),
                            "Chunk accepted"
                        );
                        continue;
                    }
                    Ok(ChunkAccepted::Partial) => ChunkFailure::FinalNotCommitted,
                    Err(e) => ChunkFailure::Rejected(e),
                },
            };

            warn!(destination = %destination, offset, error = %failure, "Chunk failed, resuming");

            // Resume until the session tells us where to continue
            loop {
                consecutive_resumes += 1;
                if consecutive_resumes > self.settings.max_resume_attempts {
                    return Err(UploadError::ResumeLimitExceeded {
                        path: destination,
                        attempts: self.settings.max_resume_attempts,
                    });
                }
                resumes += 1;

                match self.resume(job, &destination, &upload_url, total).await? {
                    ResumeStep::Resumed {
                        offset: next,
                        stream: reopened,
                    } => {
                        warn!(destination = %destination, offset = next, total, "Resumed upload");
                        offset = next;
                        stream = reopened;
                        break;
                    }
                    ResumeStep::Retry(reason) => {
                        warn!(
                            destination = %destination,
                            attempt = consecutive_resumes,
                            reason = %reason,
                            "Resume attempt failed"
                        );
                    }
                }
            }
        }
    }

    fn content_url(&self, source_path: &RemotePath) -> String {
        self.source.url(&drive_path(source_path, Some("content")))
    }

    /// Creates a resumable upload session and returns its URL
    async fn create_session(&self, destination: &RemotePath) -> Result<String, UploadError> {
        let url = self
            .destination
            .url(&drive_path(destination, Some("upload.createSession")));
        let session_error = |source| UploadError::SessionCreation {
            path: destination.clone(),
            source,
        };

        debug!(destination = %destination, "Creating upload session");
        let response = self
            .destination
            .execute_with_retry(Method::POST, &url, |r| {
                r.header(CONTENT_LENGTH, 0).body(Vec::<u8>::new())
            })
            .await
            .map_err(session_error)?;
        let response = check_status(response).await.map_err(session_error)?;

        let session: UploadSessionResponse = response.json().await.map_err(|e| {
            session_error(GraphError::InvalidResponse(format!(
                "upload session response: {e}"
            )))
        })?;

        if session.upload_url.is_empty() {
            return Err(session_error(GraphError::InvalidResponse(
                "upload session response has no uploadUrl".to_string(),
            )));
        }

        debug!(destination = %destination, "Upload session created");
        Ok(session.upload_url)
    }

    /// Creates a zero-byte file with a simple upload
    async fn create_empty(&self, destination: &RemotePath) -> Result<(), UploadError> {
        let url = self.destination.url(&drive_path(destination, Some("content")));
        let create_error = |source| UploadError::SessionCreation {
            path: destination.clone(),
            source,
        };

        let response = self
            .destination
            .execute_with_retry(Method::PUT, &url, |r| {
                r.header(CONTENT_LENGTH, 0).body(Vec::<u8>::new())
            })
            .await
            .map_err(create_error)?;
        check_status(response).await.map_err(create_error)?;
        Ok(())
    }

    /// PUTs one chunk to the pre-authenticated session URL
    async fn put_chunk(
        &self,
        upload_url: &str,
        data: &[u8],
        offset: u64,
        total: u64,
    ) -> Result<ChunkAccepted, GraphError> {
        let len = data.len() as u64;
        let content_range = format!("bytes {}-{}/{}", offset, offset + len - 1, total);

        let response = self
            .destination
            .http_client()
            .put(upload_url)
            .timeout(self.settings.chunk_timeout)
            .header(CONTENT_LENGTH, len)
            .header(CONTENT_RANGE, &content_range)
            .body(data.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::from_status(status, body));
        }

        if status == StatusCode::OK || status == StatusCode::CREATED {
            Ok(ChunkAccepted::Complete)
        } else {
            Ok(ChunkAccepted::Partial)
        }
    }

    /// Asks the session for the next byte it expects
    ///
    /// `Ok(Err(reason))` is a transient failure worth another attempt.
    async fn query_next_offset(
        &self,
        destination: &RemotePath,
        upload_url: &str,
        total: u64,
    ) -> Result<Result<u64, String>, UploadError> {
        let unresumable = |reason: String| UploadError::Unresumable {
            path: destination.clone(),
            reason,
        };

        let response = self
            .destination
            .http_client()
            .get(upload_url)
            .timeout(self.destination.request_timeout())
            .send()
            .await
            .map_err(GraphError::from);

        let response = match response {
            Ok(response) => check_status(response).await,
            Err(e) => Err(e),
        };

        let status: UploadSessionStatus = match response {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| unresumable(format!("unreadable session status: {e}")))?,
            Err(e) if e.is_transient() => return Ok(Err(format!("session status: {e}"))),
            Err(e) => return Err(unresumable(format!("session status: {e}"))),
        };

        let offset = next_expected_offset(&status.next_expected_ranges).ok_or_else(|| {
            unresumable(format!(
                "unparsable nextExpectedRanges {:?}",
                status.next_expected_ranges
            ))
        })?;

        if offset == 0 {
            return Err(unresumable("session has not received any bytes".to_string()));
        }
        if offset >= total {
            return Err(unresumable(format!(
                "session expects byte {offset} of a {total}-byte file"
            )));
        }

        Ok(Ok(offset))
    }

    /// One resume attempt: query the session, then re-open the source at `k`
    async fn resume(
        &self,
        job: &SyncJob,
        destination: &RemotePath,
        upload_url: &str,
        total: u64,
    ) -> Result<ResumeStep, UploadError> {
        let offset = match self.query_next_offset(destination, upload_url, total).await? {
            Ok(offset) => offset,
            Err(reason) => return Ok(ResumeStep::Retry(reason)),
        };

        // The listed download URL may have expired; ask for a fresh one
        let (url, authenticated) = match get_item(&self.source, &job.source_path).await {
            Ok(Some(RemoteItem::File(file))) if file.download_url.is_some() => {
                (file.download_url.unwrap_or_default(), false)
            }
            Ok(_) => (self.content_url(&job.source_path), true),
            Err(e) => {
                debug!(file = %job.source_path, error = %e, "Metadata refresh failed, using content endpoint");
                (self.content_url(&job.source_path), true)
            }
        };

        match self.open_source(&url, authenticated, offset, total).await {
            Ok(stream) => Ok(ResumeStep::Resumed { offset, stream }),
            Err(e) if e.is_transient() => Ok(ResumeStep::Retry(format!("re-open source: {e}"))),
            Err(source) => Err(UploadError::SourceUnavailable {
                path: job.source_path.clone(),
                source,
            }),
        }
    }

    /// Opens a GET stream on the source content starting at `offset`
    async fn open_source(
        &self,
        url: &str,
        authenticated: bool,
        offset: u64,
        total: u64,
    ) -> Result<SourceStream, GraphError> {
        let mut request = self.source.http_client().get(url);
        if authenticated {
            request = request.bearer_auth(self.source.access_token().await?);
        }
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={}-{}", offset, total - 1));
        }

        // Only the response head is bounded here; body reads have their own deadline
        let response = tokio::time::timeout(self.source.request_timeout(), request.send())
            .await
            .map_err(|_| GraphError::Timeout(format!("opening source {url}")))??;
        let response = check_status(response).await?;

        let skip = if offset > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
            debug!(offset, "Source ignored Range header, discarding prefix");
            offset
        } else {
            0
        };

        Ok(SourceStream::new(response, skip, self.settings.read_timeout))
    }
}
