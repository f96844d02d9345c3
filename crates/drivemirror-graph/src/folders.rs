//! Folder ensurer
//!
//! Makes sure every segment of a destination path exists as a folder before
//! anything is uploaded below it. Creation uses the provider's
//! `"@name.conflictBehavior": "fail"` policy, so an existing item is never
//! renamed or replaced.

use drivemirror_core::domain::{RemoteItem, RemotePath};
use reqwest::Method;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{drive_path, GraphClient};
use crate::listing::get_item;
use crate::{check_status, GraphError};

/// Errors raised while preparing a destination folder
#[derive(Debug, Error)]
pub enum FolderError {
    /// A path segment exists but is a file
    #[error("{path} exists but is not a folder")]
    TypeConflict { path: RemotePath },

    /// The existence check failed for a reason other than "not found"
    #[error("Failed to look up {path}: {source}")]
    Probe {
        path: RemotePath,
        #[source]
        source: GraphError,
    },

    /// The create request was rejected
    #[error("Failed to create folder {path}: {source}")]
    Create {
        path: RemotePath,
        #[source]
        source: GraphError,
    },
}

/// What a probe found at one path
enum Existing {
    Folder,
    File,
    Missing,
}

/// Ensures every segment of `path` exists as a folder
///
/// Prefixes are handled outermost first. The root always exists, so
/// `ensure_folder(&RemotePath::root())` makes no requests.
///
/// # Errors
/// The first segment that is a file, cannot be probed, or cannot be created
/// aborts the walk and is returned.
pub async fn ensure_folder(client: &GraphClient, path: &RemotePath) -> Result<(), FolderError> {
    for prefix in path.prefixes() {
        match probe(client, &prefix).await? {
            Existing::Folder => debug!(path = %prefix, "Folder exists"),
            Existing::File => return Err(FolderError::TypeConflict { path: prefix }),
            Existing::Missing => create_folder(client, &prefix).await?,
        }
    }
    Ok(())
}

async fn probe(client: &GraphClient, path: &RemotePath) -> Result<Existing, FolderError> {
    match get_item(client, path).await {
        Ok(Some(RemoteItem::Folder(_))) => Ok(Existing::Folder),
        Ok(Some(RemoteItem::File(_))) => Ok(Existing::File),
        Ok(None) => Ok(Existing::Missing),
        Err(source) => Err(FolderError::Probe {
            path: path.clone(),
            source,
        }),
    }
}

/// Creates the last segment of `path` inside its (existing) parent
async fn create_folder(client: &GraphClient, path: &RemotePath) -> Result<(), FolderError> {
    let parent = path.parent().unwrap_or_else(RemotePath::root);
    let name = path.file_name().unwrap_or_default();
    let url = client.url(&drive_path(&parent, Some("children")));
    let body = create_body(name);

    let create_error = |source| FolderError::Create {
        path: path.clone(),
        source,
    };

    let response = client
        .execute_with_retry(Method::POST, &url, |r| r.json(&body))
        .await
        .map_err(create_error)?;

    match check_status(response).await {
        Ok(_) => {
            info!(path = %path, "Created folder");
            Ok(())
        }
        // Someone else created it between our probe and the POST
        Err(GraphError::Conflict(body)) => match probe(client, path).await? {
            Existing::Folder => {
                debug!(path = %path, "Folder appeared concurrently");
                Ok(())
            }
            Existing::File => Err(FolderError::TypeConflict { path: path.clone() }),
            Existing::Missing => Err(create_error(GraphError::Conflict(body))),
        },
        Err(e) => Err(create_error(e)),
    }
}

fn create_body(name: &str) -> Value {
    json!({
        "name": name,
        "folder": {},
        "@name.conflictBehavior": "fail"
    })
}
