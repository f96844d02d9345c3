//! Integration tests for the folder ensurer
//!
//! Verifies that existing folders are left alone, missing segments are
//! created with the "fail" conflict policy, files block the path and a
//! concurrent create (409) is accepted when the folder now exists.

use drivemirror_core::domain::RemotePath;
use drivemirror_graph::folders::{ensure_folder, FolderError};
use serde_json::json;
use wiremock::{
    matchers::{body_json, method, path},
    Mock, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_root_needs_no_requests() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    ensure_folder(&client, &RemotePath::root())
        .await
        .expect("root always exists");
}

#[tokio::test]
async fn test_existing_folders_are_not_created() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_item(&server, "/drive/root:/Backup", common::folder_json("Backup", 1)).await;
    common::mount_item(
        &server,
        "/drive/root:/Backup/Photos",
        common::folder_json("Photos", 0),
    )
    .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    ensure_folder(&client, &common::remote("/Backup/Photos"))
        .await
        .expect("existing folders should be accepted");
}

#[tokio::test]
async fn test_missing_segments_are_created_in_order() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_missing(&server, "/drive/root:/Backup").await;
    common::mount_missing(&server, "/drive/root:/Backup/Photos").await;

    Mock::given(method("POST"))
        .and(path("/drive/root/children"))
        .and(body_json(json!({
            "name": "Backup",
            "folder": {},
            "@name.conflictBehavior": "fail"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::folder_json("Backup", 0)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/drive/root:/Backup:/children"))
        .and(body_json(json!({
            "name": "Photos",
            "folder": {},
            "@name.conflictBehavior": "fail"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(common::folder_json("Photos", 0)))
        .expect(1)
        .mount(&server)
        .await;

    ensure_folder(&client, &common::remote("/Backup/Photos"))
        .await
        .expect("folders should be created");
}

#[tokio::test]
async fn test_file_in_the_way_is_type_conflict() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_item(
        &server,
        "/drive/root:/Backup",
        common::file_json("Backup", 10, None),
    )
    .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = ensure_folder(&client, &common::remote("/Backup/Photos"))
        .await
        .unwrap_err();
    assert!(matches!(err, FolderError::TypeConflict { ref path } if path.as_str() == "/Backup"));
}

#[tokio::test]
async fn test_concurrent_create_conflict_is_accepted() {
    let (server, client) = common::setup_drive_mock().await;

    // First probe: missing. Re-probe after the 409: a folder.
    Mock::given(method("GET"))
        .and(path("/drive/root:/Backup"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_item(&server, "/drive/root:/Backup", common::folder_json("Backup", 0)).await;

    Mock::given(method("POST"))
        .and(path("/drive/root/children"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": "nameAlreadyExists", "message": "Name already exists" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    ensure_folder(&client, &common::remote("/Backup"))
        .await
        .expect("folder created by someone else is fine");
}

#[tokio::test]
async fn test_create_failure_is_reported() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_missing(&server, "/drive/root:/Backup").await;
    Mock::given(method("POST"))
        .and(path("/drive/root/children"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = ensure_folder(&client, &common::remote("/Backup/Photos"))
        .await
        .unwrap_err();
    assert!(matches!(err, FolderError::Create { ref path, .. } if path.as_str() == "/Backup"));
}

#[tokio::test]
async fn test_probe_failure_aborts() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root:/Backup"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = ensure_folder(&client, &common::remote("/Backup"))
        .await
        .unwrap_err();
    assert!(matches!(err, FolderError::Probe { .. }));
}
