//! Integration tests for the metadata client
//!
//! Verifies children listings (root and nested), nextLink pagination and
//! the single-item probe.

use drivemirror_core::domain::{RemoteItem, RemotePath};
use drivemirror_graph::{listing, GraphError};
use serde_json::json;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_list_root_children() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root/children"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                common::folder_json("Photos", 2),
                common::file_json("notes.txt", 12, Some("AA11"))
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = listing::list_children(&client, &RemotePath::root())
        .await
        .expect("root listing failed");

    assert_eq!(items.len(), 2);
    assert!(items[0].is_folder());
    assert_eq!(items[0].name(), "Photos");
    let file = items[1].as_file().unwrap();
    assert_eq!(file.size, 12);
    assert_eq!(file.hashes.sha1.as_deref(), Some("AA11"));
}

#[tokio::test]
async fn test_list_children_follows_next_link() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root:/Photos:/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                common::file_json("a.jpg", 10, None),
                common::file_json("b.jpg", 20, None)
            ],
            "@odata.nextLink": format!("{}/drive/root:/Photos:/children?$skiptoken=p2", server.uri())
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/root:/Photos:/children"))
        .and(query_param("$skiptoken", "p2"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [common::folder_json("2020", 1)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = listing::list_children(&client, &common::remote("/Photos"))
        .await
        .expect("paginated listing failed");

    let names: Vec<&str> = items.iter().map(RemoteItem::name).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg", "2020"]);
}

#[tokio::test]
async fn test_list_children_encodes_names() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root:/My%20Photos/%232020:/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let items = listing::list_children(&client, &common::remote("/My Photos/#2020"))
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_list_children_error_status() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_missing(&server, "/drive/root:/Gone:/children").await;

    let result = listing::list_children(&client, &common::remote("/Gone")).await;
    assert!(matches!(result, Err(GraphError::NotFound(_))));
}

#[tokio::test]
async fn test_list_children_malformed_body() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root:/Broken:/children"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = listing::list_children(&client, &common::remote("/Broken")).await;
    assert!(matches!(result, Err(GraphError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_get_item_found_and_missing() {
    let (server, client) = common::setup_drive_mock().await;

    common::mount_item(&server, "/drive/root:/Photos", common::folder_json("Photos", 4)).await;
    common::mount_missing(&server, "/drive/root:/Nope").await;

    let found = listing::get_item(&client, &common::remote("/Photos"))
        .await
        .unwrap();
    assert!(matches!(found, Some(RemoteItem::Folder(ref f)) if f.child_count == 4));

    let missing = listing::get_item(&client, &common::remote("/Nope"))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_get_item_server_error_is_err() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root:/Photos"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = listing::get_item(&client, &common::remote("/Photos")).await;
    assert!(matches!(result, Err(GraphError::ServerError(_))));
}
