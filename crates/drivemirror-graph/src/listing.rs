//! Metadata client: folder listings and single-item probes
//!
//! Lists the children of a remote folder and follows `@odata.nextLink`
//! until the provider stops returning one. Every call builds fresh
//! [`RemoteItem`]s; nothing is cached.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use drivemirror_core::domain::RemotePath;
//! use drivemirror_graph::auth::StaticTokenProvider;
//! use drivemirror_graph::client::GraphClient;
//! use drivemirror_graph::listing;
//!
//! # async fn example() -> Result<(), drivemirror_graph::GraphError> {
//! let client = GraphClient::new(Arc::new(StaticTokenProvider::new("access-token")));
//! let photos = RemotePath::normalize("/Photos").unwrap();
//! let items = listing::list_children(&client, &photos).await?;
//! println!("Got {} items", items.len());
//! # Ok(())
//! # }
//! ```

use drivemirror_core::domain::{FileHashes, RemoteFile, RemoteFolder, RemoteItem, RemotePath};
use serde::Deserialize;
use tracing::debug;

use crate::client::{drive_path, GraphClient};
use crate::GraphError;

// ============================================================================
// Drive API response types (JSON deserialization)
// ============================================================================

/// One page of a children listing
///
/// `GET /drive/root:{path}:/children`
#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,

    /// Absolute URL of the next page (present when more pages exist)
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// A driveItem resource, reduced to the fields the mirror needs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriveItem {
    #[serde(default)]
    name: String,

    /// Size in bytes (folders report the size of their contents)
    #[serde(default)]
    size: u64,

    /// Reference to the parent item
    parent_reference: Option<ParentReference>,

    /// Present if the item is a file
    file: Option<FileFacet>,

    /// Present if the item is a folder
    folder: Option<FolderFacet>,

    /// Pre-authenticated, short-lived content URL
    #[serde(rename = "@content.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentReference {
    /// Parent path, e.g. `/drive/root:/Photos`
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileFacet {
    hashes: Option<Hashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hashes {
    /// SHA-1 digest, hex (personal drives)
    sha1_hash: Option<String>,
    /// QuickXorHash digest, Base64 (business drives)
    quick_xor_hash: Option<String>,
}

/// Folder facet; its presence alone marks the item as a folder
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderFacet {
    #[serde(default)]
    child_count: u64,
}

impl From<DriveItem> for RemoteItem {
    fn from(item: DriveItem) -> Self {
        let parent_path = item.parent_reference.and_then(|p| p.path);

        if let Some(folder) = item.folder {
            return RemoteItem::Folder(RemoteFolder {
                name: item.name,
                child_count: folder.child_count,
                parent_path,
            });
        }

        let hashes = item
            .file
            .and_then(|f| f.hashes)
            .map(|h| FileHashes {
                sha1: h.sha1_hash,
                quick_xor: h.quick_xor_hash,
            })
            .unwrap_or_default();

        RemoteItem::File(RemoteFile {
            name: item.name,
            size: item.size,
            parent_path,
            download_url: item.download_url,
            hashes,
        })
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Lists every child of `path`, following pagination
///
/// Pages are concatenated in provider order.
///
/// # Errors
/// Returns the classified [`GraphError`] for the first page that fails;
/// items from earlier pages are discarded.
pub async fn list_children(
    client: &GraphClient,
    path: &RemotePath,
) -> Result<Vec<RemoteItem>, GraphError> {
    let mut url = client.url(&drive_path(path, Some("children")));
    let mut items = Vec::new();
    let mut page_count: u32 = 0;

    loop {
        page_count += 1;
        let page: ChildrenPage = client.get_json(&url).await?;

        debug!(
            path = %path,
            page = page_count,
            items = page.value.len(),
            has_next = page.next_link.is_some(),
            "Received listing page"
        );

        items.extend(page.value.into_iter().map(RemoteItem::from));

        match page.next_link {
            Some(next) if next != url => url = next,
            Some(_) => {
                return Err(GraphError::InvalidResponse(format!(
                    "nextLink for {path} points back at the same page"
                )))
            }
            None => break,
        }
    }

    debug!(path = %path, total_items = items.len(), pages = page_count, "Listing complete");
    Ok(items)
}

/// Fetches the metadata of a single item
///
/// Returns `Ok(None)` when the item does not exist.
///
/// # Errors
/// Any failure other than 404 Not Found.
pub async fn get_item(
    client: &GraphClient,
    path: &RemotePath,
) -> Result<Option<RemoteItem>, GraphError> {
    let url = client.url(&drive_path(path, None));
    match client.get_json::<DriveItem>(&url).await {
        Ok(item) => Ok(Some(item.into())),
        Err(GraphError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
