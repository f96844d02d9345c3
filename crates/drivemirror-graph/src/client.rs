//! Authenticated HTTP client for the drive API
//!
//! Wraps `reqwest::Client` with bearer authentication from a shared
//! [`TokenProvider`], base URL construction, per-request deadlines and
//! `429 Too Many Requests` handling.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drivemirror_graph::auth::StaticTokenProvider;
//! use drivemirror_graph::client::GraphClient;
//!
//! let client = GraphClient::new(Arc::new(StaticTokenProvider::new("access-token")));
//! assert!(client.url("/drive/root").ends_with("/drive/root"));
//! ```

use std::{sync::Arc, time::Duration};

use drivemirror_core::config::DEFAULT_API_BASE_URL;
use drivemirror_core::domain::RemotePath;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::auth::TokenProvider;
use crate::GraphError;

/// Default retry-after duration when the header is missing or unparsable
pub(crate) const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Longest Retry-After we honour from an HTTP-date header
const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Number of 429 responses tolerated per request
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Deadline for metadata, folder and session requests
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters left unescaped inside one path segment (RFC 3986 unreserved)
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for one drive account
///
/// Cheap to clone; clones share the connection pool and the token provider.
#[derive(Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
    /// Source of bearer tokens
    tokens: Arc<dyn TokenProvider>,
    /// Deadline applied to every request sent through this client
    request_timeout: Duration,
    /// Number of 429 responses tolerated before giving up
    max_retries: u32,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl GraphClient {
    /// Creates a client for the public OneDrive API
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_url(tokens, DEFAULT_API_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(tokens: Arc<dyn TokenProvider>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets the deadline for metadata, folder and session requests
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how many 429 responses are waited out per request
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the absolute URL for an API path (e.g. `/drive/root/children`)
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Returns a currently valid access token
    pub async fn access_token(&self) -> Result<String, GraphError> {
        self.tokens
            .access_token()
            .await
            .map_err(|e| GraphError::Unauthorized(format!("{e:#}")))
    }

    /// Creates an authenticated request builder for an absolute URL
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, GraphError> {
        let token = self.access_token().await?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .timeout(self.request_timeout))
    }

    // ========================================================================
    // execute_with_retry - 429 response handling
    // ========================================================================

    /// Sends an authenticated request, waiting out `429` responses
    ///
    /// `build` customises each attempt (headers, body); it is called once
    /// per attempt because a request builder cannot be reused. Any response
    /// other than 429 is returned as-is, so callers classify the status.
    ///
    /// # Errors
    /// Returns [`GraphError::TooManyRequests`] when the retry budget is
    /// exhausted, or a transport error ([`GraphError::Timeout`] /
    /// [`GraphError::Network`]).
    pub async fn execute_with_retry<F>(
        &self,
        method: Method,
        url: &str,
        build: F,
    ) -> Result<Response, GraphError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut retry_after = DEFAULT_RETRY_AFTER;

        for attempt in 0..=self.max_retries {
            let request = build(self.request(method.clone(), url).await?);
            let response = request.send().await?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                if attempt > 0 {
                    info!(url, attempt, "Request succeeded after retry");
                }
                return Ok(response);
            }

            retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER))
                .unwrap_or(DEFAULT_RETRY_AFTER);

            if attempt >= self.max_retries {
                warn!(url, attempts = attempt + 1, "429 retry limit exhausted");
                break;
            }

            info!(
                url,
                attempt,
                retry_after_ms = retry_after.as_millis() as u64,
                "Received 429, backing off"
            );
            tokio::time::sleep(retry_after).await;
        }

        Err(GraphError::TooManyRequests { retry_after })
    }

    /// GETs an absolute URL and decodes a JSON body
    ///
    /// Non-success statuses become the matching [`GraphError`].
    pub async fn get_json<T>(&self, url: &str) -> Result<T, GraphError>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(url, "GET");
        let response = self.execute_with_retry(Method::GET, url, |r| r).await?;
        let response = crate::check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GraphError::InvalidResponse(format!("{url}: {e}")))
    }

    /// Returns the underlying HTTP client
    ///
    /// Used for requests that must not carry the bearer token, such as
    /// pre-authenticated upload session URLs.
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}

// ============================================================================
// Path helpers
// ============================================================================

/// Builds the API path addressing `path` on the drive root
///
/// - `/` becomes `/drive/root` (or `/drive/root/{action}`)
/// - `/a b/c` becomes `/drive/root:/a%20b/c` (or `...:/{action}`)
///
/// Each segment is percent-encoded, so names containing `#`, `?`, `%` or
/// `:` address the right item.
pub fn drive_path(path: &RemotePath, action: Option<&str>) -> String {
    if path.is_root() {
        return match action {
            Some(action) => format!("/drive/root/{action}"),
            None => "/drive/root".to_string(),
        };
    }

    let encoded: String = path
        .segments()
        .map(|segment| format!("/{}", utf8_percent_encode(segment, PATH_SEGMENT)))
        .collect();

    match action {
        Some(action) => format!("/drive/root:{encoded}:/{action}"),
        None => format!("/drive/root:{encoded}"),
    }
}

/// Parses a `Retry-After` header value
///
/// Accepts delay-seconds or an HTTP-date; anything else yields `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(secs) = u64::try_from(diff.num_seconds()) {
            if secs <= MAX_RETRY_AFTER_SECS {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
