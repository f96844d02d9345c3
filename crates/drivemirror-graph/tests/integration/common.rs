//! Shared test helpers for drive API integration tests
//!
//! Each helper mounts the necessary mock endpoints on a wiremock server.
//! Clients returned here point at the mock server and authenticate with a
//! fixed token.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use drivemirror_core::domain::{FileHashes, RemoteFile, RemotePath, SyncJob};
use drivemirror_graph::auth::StaticTokenProvider;
use drivemirror_graph::client::GraphClient;

pub const TEST_TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a client pointing at it
pub async fn setup_drive_mock() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let client = client_for(&server);
    (server, client)
}

pub fn client_for(server: &MockServer) -> GraphClient {
    GraphClient::with_base_url(Arc::new(StaticTokenProvider::new(TEST_TOKEN)), server.uri())
}

pub fn remote(path: &str) -> RemotePath {
    RemotePath::new(path.to_string()).unwrap()
}

/// driveItem JSON for a folder
pub fn folder_json(name: &str, child_count: u64) -> Value {
    json!({
        "name": name,
        "size": 0,
        "folder": { "childCount": child_count }
    })
}

/// driveItem JSON for a file
pub fn file_json(name: &str, size: u64, sha1: Option<&str>) -> Value {
    let mut file = json!({ "mimeType": "application/octet-stream" });
    if let Some(sha1) = sha1 {
        file["hashes"] = json!({ "sha1Hash": sha1 });
    }
    json!({
        "name": name,
        "size": size,
        "file": file
    })
}

/// Mounts `GET {api_path}` returning `body`
pub async fn mount_item(server: &MockServer, api_path: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(api_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts `GET {api_path}` returning 404
pub async fn mount_missing(server: &MockServer, api_path: &str) {
    Mock::given(method("GET"))
        .and(path(api_path))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "itemNotFound", "message": "Item does not exist" }
        })))
        .mount(server)
        .await;
}

/// Matches requests that carry no `Authorization` header
pub struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

/// Test file content: `len` bytes of a repeating pattern
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A job copying `/src_dir/name` into `dest_dir`
pub fn job(name: &str, size: u64, src_dir: &str, dest_dir: &str) -> SyncJob {
    SyncJob {
        file: RemoteFile {
            name: name.to_string(),
            size,
            parent_path: Some(format!("/drive/root:{src_dir}")),
            download_url: None,
            hashes: FileHashes::default(),
        },
        source_path: remote(&format!("{src_dir}/{name}")),
        destination_folder: remote(dest_dir),
        destination_account: "destination".to_string(),
    }
}
