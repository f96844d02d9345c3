//! On-disk token storage
//!
//! One JSON file per account (`tokens-source.json`,
//! `tokens-destination.json`) under `$XDG_DATA_HOME/drivemirror/`. Files are
//! written with mode 0600 on unix.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use drivemirror_graph::auth::Tokens;
use thiserror::Error;
use tracing::debug;

use crate::commands::AccountRole;

const STORAGE_DIR: &str = "drivemirror";

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("data directory unavailable for token storage")]
    MissingDataDir,
    #[error("no stored tokens for the {0} account; run `drivemirror auth {0}` first")]
    NotFound(AccountRole),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt token file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and writes per-account [`Tokens`]
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the platform data directory
    pub fn default_location() -> Result<Self, TokenStoreError> {
        let dir = dirs::data_dir()
            .ok_or(TokenStoreError::MissingDataDir)?
            .join(STORAGE_DIR);
        Ok(Self::new(dir))
    }

    pub fn path_for(&self, account: AccountRole) -> PathBuf {
        self.dir.join(format!("tokens-{account}.json"))
    }

    pub fn save(&self, account: AccountRole, tokens: &Tokens) -> Result<(), TokenStoreError> {
        let path = self.path_for(account);
        let io_error = |source| TokenStoreError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(|source| TokenStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_vec_pretty(tokens).map_err(|source| {
            TokenStoreError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .map_err(io_error)?;
        file.write_all(&json).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).map_err(io_error)?;
        }

        debug!(account = %account, path = %path.display(), "Stored tokens");
        Ok(())
    }

    /// Loads the tokens of `account`, failing with [`TokenStoreError::NotFound`]
    /// if none were stored
    pub fn load(&self, account: AccountRole) -> Result<Tokens, TokenStoreError> {
        let path = self.path_for(account);
        if !path.exists() {
            return Err(TokenStoreError::NotFound(account));
        }
        read_tokens(&path)
    }

    pub fn has_tokens(&self, account: AccountRole) -> bool {
        self.path_for(account).exists()
    }
}

fn read_tokens(path: &Path) -> Result<Tokens, TokenStoreError> {
    let data = fs::read(path).map_err(|source| TokenStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| TokenStoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}
