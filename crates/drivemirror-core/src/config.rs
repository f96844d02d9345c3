//! Configuration module for DriveMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub accounts: AccountsConfig,
    pub sync: SyncConfig,
    pub transfer: TransferConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// OAuth application settings for both sides of the mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Account the files are read from.
    pub source: AccountConfig,
    /// Account the files are uploaded to.
    pub destination: AccountConfig,
}

/// OAuth application registration for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Application (client) ID. Empty until the user fills it in.
    pub client_id: String,
    /// Client secret, for web-style app registrations.
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Which folders to mirror and how many uploads run at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Folder on the source account, e.g. `/Photos`.
    pub source_dir: String,
    /// Folder on the destination account, e.g. `/Backup/Photos`.
    pub destination_dir: String,
    /// Number of concurrent upload workers.
    pub workers: usize,
    /// Jobs that may wait in the queue while every worker is busy.
    pub queue_depth: usize,
}

/// Upload session and network deadline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Base URL of the drive API.
    pub api_base_url: String,
    /// Size of each upload chunk (in KiB). Must be a multiple of 320.
    pub chunk_size_kib: u64,
    /// Consecutive resume attempts before a file is given up for this round.
    pub max_resume_attempts: u32,
    /// Deadline for metadata, folder and session requests.
    pub request_timeout_secs: u64,
    /// Deadline for a single chunk PUT.
    pub chunk_timeout_secs: u64,
    /// Deadline for each read from a source download stream.
    pub read_timeout_secs: u64,
}

/// How the worker pool retries a failed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per file. `None` (YAML `null`) retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry (in seconds).
    pub delay_secs: u64,
    /// Backoff schedule: `fixed` or `exponential`.
    pub backoff: BackoffKind,
    /// Upper bound for exponential backoff (in seconds).
    pub max_delay_secs: u64,
}

/// Backoff schedule selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemirror")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default OneDrive API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.onedrive.com/v1.0";

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_url: "https://login.live.com/oauth20_authorize.srf".to_string(),
            token_url: "https://login.live.com/oauth20_token.srf".to_string(),
            redirect_uri: "https://login.live.com/oauth20_desktop.srf".to_string(),
            scopes: vec!["onedrive.readwrite".to_string(), "offline_access".to_string()],
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_dir: "/".to_string(),
            destination_dir: "/".to_string(),
            workers: 5,
            queue_depth: 1,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            chunk_size_kib: 10 * 1024,
            max_resume_attempts: 4,
            request_timeout_secs: 60,
            chunk_timeout_secs: 300,
            read_timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            delay_secs: 5,
            backoff: BackoffKind::Fixed,
            max_delay_secs: 300,
        }
    }
}

impl Default for BackoffKind {
    fn default() -> Self {
        Self::Fixed
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upload chunks must be multiples of this many KiB.
const CHUNK_ALIGNMENT_KIB: u64 = 320;

/// Largest chunk the upload session endpoint accepts (60 MiB).
const MAX_CHUNK_SIZE_KIB: u64 = 60 * 1024;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- accounts ---
        for (name, account) in [
            ("accounts.source", &self.accounts.source),
            ("accounts.destination", &self.accounts.destination),
        ] {
            if account.client_id.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("{name}.client_id"),
                    message: "must not be empty".into(),
                });
            }
            for (field, value) in [("auth_url", &account.auth_url), ("token_url", &account.token_url)]
            {
                if !value.starts_with("https://") && !value.starts_with("http://") {
                    errors.push(ValidationError {
                        field: format!("{name}.{field}"),
                        message: format!("not an http(s) URL: {value}"),
                    });
                }
            }
        }

        // --- sync ---
        if self.sync.workers == 0 {
            errors.push(ValidationError {
                field: "sync.workers".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.queue_depth == 0 {
            errors.push(ValidationError {
                field: "sync.queue_depth".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- transfer ---
        if self.transfer.chunk_size_kib == 0
            || self.transfer.chunk_size_kib % CHUNK_ALIGNMENT_KIB != 0
        {
            errors.push(ValidationError {
                field: "transfer.chunk_size_kib".into(),
                message: format!(
                    "must be a positive multiple of {CHUNK_ALIGNMENT_KIB}, got {}",
                    self.transfer.chunk_size_kib
                ),
            });
        }
        if self.transfer.chunk_size_kib > MAX_CHUNK_SIZE_KIB {
            errors.push(ValidationError {
                field: "transfer.chunk_size_kib".into(),
                message: format!("must not exceed {MAX_CHUNK_SIZE_KIB}"),
            });
        }
        for (field, value) in [
            ("transfer.request_timeout_secs", self.transfer.request_timeout_secs),
            ("transfer.chunk_timeout_secs", self.transfer.chunk_timeout_secs),
            ("transfer.read_timeout_secs", self.transfer.read_timeout_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }
        if !self.transfer.api_base_url.starts_with("https://")
            && !self.transfer.api_base_url.starts_with("http://")
        {
            errors.push(ValidationError {
                field: "transfer.api_base_url".into(),
                message: format!("not an http(s) URL: {}", self.transfer.api_base_url),
            });
        }

        // --- retry ---
        if self.retry.max_attempts == Some(0) {
            errors.push(ValidationError {
                field: "retry.max_attempts".into(),
                message: "must be greater than 0, or null to retry forever".into(),
            });
        }
        if self.retry.backoff == BackoffKind::Exponential
            && self.retry.max_delay_secs < self.retry.delay_secs
        {
            errors.push(ValidationError {
                field: "retry.max_delay_secs".into(),
                message: format!(
                    "max_delay_secs ({}) must not be below delay_secs ({})",
                    self.retry.max_delay_secs, self.retry.delay_secs
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemirror_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .source_dir("/Photos")
///     .destination_dir("/Backup/Photos")
///     .workers(3)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- accounts ---

    pub fn source_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.accounts.source.client_id = client_id.into();
        self
    }

    pub fn destination_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.accounts.destination.client_id = client_id.into();
        self
    }

    // --- sync ---

    pub fn source_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.sync.source_dir = dir.into();
        self
    }

    pub fn destination_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.sync.destination_dir = dir.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.sync.workers = n;
        self
    }

    pub fn queue_depth(mut self, n: usize) -> Self {
        self.config.sync.queue_depth = n;
        self
    }

    // --- transfer ---

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.transfer.api_base_url = url.into();
        self
    }

    pub fn chunk_size_kib(mut self, kib: u64) -> Self {
        self.config.transfer.chunk_size_kib = kib;
        self
    }

    pub fn max_resume_attempts(mut self, n: u32) -> Self {
        self.config.transfer.max_resume_attempts = n;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn retry_delay_secs(mut self, seconds: u64) -> Self {
        self.config.retry.delay_secs = seconds;
        self
    }

    pub fn retry_backoff(mut self, backoff: BackoffKind) -> Self {
        self.config.retry.backoff = backoff;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
