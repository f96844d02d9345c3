//! Integration tests for the upload session manager
//!
//! Verifies chunked uploads with exact Content-Range headers, the empty-file
//! path, resume from the offset the session reports, and the failure modes
//! that end an attempt.

use std::time::Duration;

use drivemirror_core::ports::{IFileTransfer, UploadOutcome};
use drivemirror_graph::upload::{GraphTransfer, TransferSettings, UploadError};
use serde_json::json;
use wiremock::{
    matchers::{body_bytes, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{self, NoAuthorization};

/// Chunk size used by these tests (alignment is a config-level rule)
const CHUNK: usize = 10;

fn transfer(server: &MockServer, max_resume_attempts: u32) -> GraphTransfer {
    GraphTransfer::new(
        common::client_for(server),
        common::client_for(server),
        TransferSettings {
            chunk_size: CHUNK,
            max_resume_attempts,
            chunk_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        },
    )
}

async fn mount_source(server: &MockServer, api_path: &str, data: &[u8]) {
    Mock::given(method("GET"))
        .and(path(api_path))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.to_vec()))
        .mount(server)
        .await;
}

async fn mount_session(server: &MockServer, api_path: &str) -> String {
    let upload_url = format!("{}/upload/session-1", server.uri());
    Mock::given(method("POST"))
        .and(path(api_path))
        .and(body_bytes(Vec::<u8>::new()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": upload_url,
            "expirationDateTime": "2030-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(server)
        .await;
    upload_url
}

async fn mount_chunk(server: &MockServer, range: &str, data: &[u8], status: u16, times: u64) {
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("Content-Range", range))
        .and(body_bytes(data.to_vec()))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({})))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_multi_chunk_upload() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;
    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 202, 1).await;
    mount_chunk(&server, "bytes 10-19/25", &data[10..20], 202, 1).await;
    mount_chunk(&server, "bytes 20-24/25", &data[20..25], 201, 1).await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let outcome = transfer(&server, 4).upload_file(&job).await.expect("upload failed");

    assert_eq!(
        outcome,
        UploadOutcome::Uploaded {
            bytes: 25,
            resumes: 0
        }
    );
}

#[tokio::test]
async fn test_exact_multiple_of_chunk_size() {
    let server = MockServer::start().await;
    let data = common::content(20);

    mount_source(&server, "/drive/root:/Photos/b.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/b.bin:/upload.createSession").await;
    mount_chunk(&server, "bytes 0-9/20", &data[0..10], 202, 1).await;
    mount_chunk(&server, "bytes 10-19/20", &data[10..20], 200, 1).await;

    let job = common::job("b.bin", 20, "/Photos", "/Backup");
    let outcome = transfer(&server, 4).upload(&job).await.unwrap();
    assert!(matches!(outcome, UploadOutcome::Uploaded { bytes: 20, .. }));
}

#[tokio::test]
async fn test_zero_byte_file_uses_simple_upload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/drive/root:/Backup/empty.txt:/content"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::file_json("empty.txt", 0, None)))
        .expect(1)
        .mount(&server)
        .await;

    let job = common::job("empty.txt", 0, "/Photos", "/Backup");
    let outcome = transfer(&server, 4).upload(&job).await.unwrap();
    assert_eq!(outcome, UploadOutcome::CreatedEmpty);
}

#[tokio::test]
async fn test_resume_continues_at_reported_offset() {
    let server = MockServer::start().await;
    let data = common::content(25);
    let download_url = format!("{}/download/a.bin", server.uri());

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    let upload_url = mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;

    // First chunk lands; the second fails once, then succeeds after resume
    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 202, 1).await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("Content-Range", "bytes 10-19/25"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_chunk(&server, "bytes 10-19/25", &data[10..20], 202, 1).await;
    mount_chunk(&server, "bytes 20-24/25", &data[20..25], 201, 1).await;

    // The session reports byte 10 as next expected
    Mock::given(method("GET"))
        .and(path("/upload/session-1"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expirationDateTime": "2030-01-01T00:00:00Z",
            "nextExpectedRanges": ["10-"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Fresh metadata provides a new pre-authenticated download URL
    common::mount_item(
        &server,
        "/drive/root:/Photos/a.bin",
        json!({
            "name": "a.bin",
            "size": 25,
            "file": {},
            "@content.downloadUrl": download_url
        }),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/download/a.bin"))
        .and(header("Range", "bytes=10-24"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(206).set_body_bytes(data[10..].to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let outcome = transfer(&server, 4).upload(&job).await.expect("resumed upload failed");

    assert_eq!(
        outcome,
        UploadOutcome::Uploaded {
            bytes: 25,
            resumes: 1
        }
    );
    assert!(upload_url.ends_with("/upload/session-1"));
}

/// Session status reporting `next` as the first missing byte
async fn mount_session_status(server: &MockServer, next: &str) {
    Mock::given(method("GET"))
        .and(path("/upload/session-1"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expirationDateTime": "2030-01-01T00:00:00Z",
            "nextExpectedRanges": [next]
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Fresh metadata for `/Photos/{name}` pointing at a download URL that
/// serves `data[start..]` for the given Range header
async fn mount_ranged_download(server: &MockServer, name: &str, data: &[u8], start: usize) {
    let download_url = format!("{}/download/{name}", server.uri());
    common::mount_item(
        server,
        &format!("/drive/root:/Photos/{name}"),
        json!({
            "name": name,
            "size": data.len(),
            "file": {},
            "@content.downloadUrl": download_url
        }),
    )
    .await;

    Mock::given(method("GET"))
        .and(path(format!("/download/{name}")))
        .and(header("Range", format!("bytes={}-{}", start, data.len() - 1).as_str()))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(206).set_body_bytes(data[start..].to_vec()))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_truncated_source_stream_resumes() {
    let server = MockServer::start().await;
    let data = common::content(25);

    // The first download ends after 15 of 25 bytes
    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data[..15]).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;

    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 202, 1).await;
    mount_chunk(&server, "bytes 10-19/25", &data[10..20], 202, 1).await;
    mount_chunk(&server, "bytes 20-24/25", &data[20..25], 201, 1).await;

    mount_session_status(&server, "10-").await;
    mount_ranged_download(&server, "a.bin", &data, 10).await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let outcome = transfer(&server, 4).upload(&job).await.expect("resumed upload failed");

    assert_eq!(
        outcome,
        UploadOutcome::Uploaded {
            bytes: 25,
            resumes: 1
        }
    );
}

#[tokio::test]
async fn test_final_chunk_accepted_without_commit_resumes() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;

    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 202, 1).await;
    mount_chunk(&server, "bytes 10-19/25", &data[10..20], 202, 1).await;

    // The last chunk is first answered 202, which does not finish the file
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("Content-Range", "bytes 20-24/25"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_chunk(&server, "bytes 20-24/25", &data[20..25], 201, 1).await;

    mount_session_status(&server, "20-").await;
    mount_ranged_download(&server, "a.bin", &data, 20).await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let outcome = transfer(&server, 4).upload(&job).await.unwrap();

    assert_eq!(
        outcome,
        UploadOutcome::Uploaded {
            bytes: 25,
            resumes: 1
        }
    );
}

#[tokio::test]
async fn test_completion_before_last_chunk_is_size_mismatch() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;
    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 201, 1).await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let err = transfer(&server, 4).upload(&job).await.unwrap_err();

    assert!(
        matches!(err, UploadError::SizeMismatch { sent: 10, total: 25, .. }),
        "got {err}"
    );
}

#[tokio::test]
async fn test_resume_from_source_that_ignores_range() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;

    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 202, 1).await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("Content-Range", "bytes 10-19/25"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_chunk(&server, "bytes 10-19/25", &data[10..20], 202, 1).await;
    mount_chunk(&server, "bytes 20-24/25", &data[20..25], 201, 1).await;

    Mock::given(method("GET"))
        .and(path("/upload/session-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextExpectedRanges": ["10-24"]
        })))
        .mount(&server)
        .await;

    // No download URL in the refreshed metadata: fall back to the content
    // endpoint, which answers 200 with the whole file
    common::mount_item(&server, "/drive/root:/Photos/a.bin", common::file_json("a.bin", 25, None))
        .await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let outcome = transfer(&server, 4).upload(&job).await.unwrap();
    assert!(matches!(outcome, UploadOutcome::Uploaded { resumes: 1, .. }));
}

#[tokio::test]
async fn test_resume_at_offset_zero_is_unresumable() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;

    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/upload/session-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextExpectedRanges": ["0-"]
        })))
        .mount(&server)
        .await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let err = transfer(&server, 4).upload(&job).await.unwrap_err();
    assert!(matches!(err, UploadError::Unresumable { .. }), "got {err}");
}

#[tokio::test]
async fn test_unparsable_session_status_is_unresumable() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;
    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 202, 1).await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("Content-Range", "bytes 10-19/25"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/upload/session-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextExpectedRanges": []
        })))
        .mount(&server)
        .await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let err = transfer(&server, 4).upload(&job).await.unwrap_err();
    assert!(matches!(err, UploadError::Unresumable { .. }), "got {err}");
}

#[tokio::test]
async fn test_resume_limit_is_enforced() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    mount_session(&server, "/drive/root:/Backup/a.bin:/upload.createSession").await;
    mount_chunk(&server, "bytes 0-9/25", &data[0..10], 202, 1).await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("Content-Range", "bytes 10-19/25"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    // Session status keeps failing transiently
    Mock::given(method("GET"))
        .and(path("/upload/session-1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let err = transfer(&server, 2).upload(&job).await.unwrap_err();
    assert!(
        matches!(err, UploadError::ResumeLimitExceeded { attempts: 2, .. }),
        "got {err}"
    );
}

#[tokio::test]
async fn test_session_creation_failure() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    Mock::given(method("POST"))
        .and(path("/drive/root:/Backup/a.bin:/upload.createSession"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let err = transfer(&server, 4).upload(&job).await.unwrap_err();
    assert!(matches!(err, UploadError::SessionCreation { .. }));
}

#[tokio::test]
async fn test_session_without_upload_url_fails() {
    let server = MockServer::start().await;
    let data = common::content(25);

    mount_source(&server, "/drive/root:/Photos/a.bin:/content", &data).await;
    Mock::given(method("POST"))
        .and(path("/drive/root:/Backup/a.bin:/upload.createSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uploadUrl": "" })))
        .mount(&server)
        .await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let err = transfer(&server, 4).upload(&job).await.unwrap_err();
    assert!(matches!(err, UploadError::SessionCreation { .. }));
}

#[tokio::test]
async fn test_missing_source_is_unavailable() {
    let server = MockServer::start().await;

    common::mount_missing(&server, "/drive/root:/Photos/a.bin:/content").await;

    let job = common::job("a.bin", 25, "/Photos", "/Backup");
    let err = transfer(&server, 4).upload(&job).await.unwrap_err();
    assert!(matches!(err, UploadError::SourceUnavailable { .. }));
}
