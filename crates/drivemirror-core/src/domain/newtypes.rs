//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// A drive-relative remote path (must start with /)
///
/// Represents paths as the user sees them in the drive, e.g.
/// `"/Photos/2020/a.jpg"`. Provider-specific prefixes such as
/// `/drive/root:` are never part of a `RemotePath`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if path doesn't start with /, contains `//` or `..`
    pub fn new(path: String) -> Result<Self, DomainError> {
        if !path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must start with '/': {path}"
            )));
        }

        // Validate no double slashes (except root)
        if path.len() > 1 && path.contains("//") {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains invalid double slashes: {path}"
            )));
        }

        // Validate no path traversal
        if path.split('/').any(|segment| segment == "..") {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains invalid traversal: {path}"
            )));
        }

        if path.len() > 1 && path.ends_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must not end with '/': {path}"
            )));
        }

        Ok(Self(path))
    }

    /// Builds a RemotePath from user input such as a config value.
    ///
    /// Accepts `"Photos"`, `"/Photos/"` and `"Photos/2020"` alike: a leading
    /// slash is added and trailing slashes are dropped. The empty string
    /// and `"/"` both yield the root.
    ///
    /// # Errors
    /// Returns error if the normalized path is still invalid
    pub fn normalize(input: &str) -> Result<Self, DomainError> {
        let trimmed = input.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        Self::new(format!("/{trimmed}"))
    }

    /// Create the root path "/"
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true if this is the drive root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a path component
    ///
    /// # Errors
    /// Returns error if component is invalid
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty() || component.contains('/') || component == ".." {
            return Err(DomainError::InvalidRemotePath(format!(
                "Invalid path component: {component}"
            )));
        }

        let new_path = if self.is_root() {
            format!("/{component}")
        } else {
            format!("{}/{component}", self.0)
        };

        Self::new(new_path)
    }

    /// Get the parent path
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Get the file name component
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }

        self.0.rsplit('/').next()
    }

    /// Iterates over the path segments, outermost first
    ///
    /// The root has no segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Every ancestor-or-self prefix, outermost first, excluding the root
    ///
    /// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
    #[must_use]
    pub fn prefixes(&self) -> Vec<Self> {
        let mut current = Self::root();
        let mut out = Vec::new();
        for segment in self.segments() {
            current = if current.is_root() {
                Self(format!("/{segment}"))
            } else {
                Self(format!("{}/{segment}", current.0))
            };
            out.push(current.clone());
        }
        out
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}
