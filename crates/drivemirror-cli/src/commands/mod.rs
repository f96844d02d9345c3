pub mod auth;
pub mod config;
pub mod sync;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use drivemirror_core::config::{AccountConfig, Config};

/// Which side of the mirror an account plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AccountRole {
    Source,
    Destination,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Source => "source",
            AccountRole::Destination => "destination",
        }
    }

    /// The application registration for this account
    pub fn account_config<'a>(&self, config: &'a Config) -> &'a AccountConfig {
        match self {
            AccountRole::Source => &config.accounts.source,
            AccountRole::Destination => &config.accounts.destination,
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loads the config file, or defaults when it does not exist
///
/// A file that exists but cannot be parsed is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No configuration file, using defaults");
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}
