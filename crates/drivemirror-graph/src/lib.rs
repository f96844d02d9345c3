//! DriveMirror Graph - OneDrive API adapter
//!
//! Provides the async pieces that talk to the drive API:
//! - OAuth2 authorization-code flow and refreshing credentials
//! - Folder listings with `@odata.nextLink` pagination
//! - Destination folder creation with a "fail on conflict" policy
//! - Chunked, resumable uploads streamed from one account to another
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 flow, [`auth::Tokens`] and the [`auth::TokenProvider`] service
//! - [`client`] - Authenticated HTTP client with 429 handling and deadlines
//! - [`listing`] - Metadata client (children listings, single-item probes)
//! - [`folders`] - Folder ensurer
//! - [`upload`] - Upload session manager
//! - [`provider`] - Port implementations used by the sync engine

pub mod auth;
pub mod client;
pub mod folders;
pub mod listing;
pub mod provider;
pub mod upload;

use std::time::Duration;

use reqwest::{Response, StatusCode};
use thiserror::Error;

/// Errors that can occur when communicating with the drive API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conflict was detected (e.g., the name is already taken)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(reqwest::Error),

    /// A request or read did not finish within its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other non-success status
    #[error("Unexpected status {status}: {body}")]
    Unexpected {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },
}

impl From<reqwest::Error> for GraphError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GraphError::Timeout(err.to_string())
        } else {
            GraphError::Network(err)
        }
    }
}

impl GraphError {
    /// Classifies a non-success status and its body
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => GraphError::Unauthorized(body),
            StatusCode::FORBIDDEN => GraphError::Forbidden(body),
            StatusCode::NOT_FOUND => GraphError::NotFound(body),
            StatusCode::CONFLICT => GraphError::Conflict(body),
            StatusCode::TOO_MANY_REQUESTS => GraphError::TooManyRequests {
                retry_after: client::DEFAULT_RETRY_AFTER,
            },
            s if s.is_server_error() => GraphError::ServerError(format!("{s}: {body}")),
            s => GraphError::Unexpected {
                status: s.as_u16(),
                body,
            },
        }
    }

    /// Returns true for errors that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GraphError::TooManyRequests { .. }
                | GraphError::ServerError(_)
                | GraphError::Network(_)
                | GraphError::Timeout(_)
        )
    }
}

/// Passes a success response through, or turns it into a [`GraphError`]
pub(crate) async fn check_status(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    Err(GraphError::from_status(status, body))
}
