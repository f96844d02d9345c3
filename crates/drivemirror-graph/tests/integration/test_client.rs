//! Integration tests for the HTTP client's 429 handling

use drivemirror_core::domain::RemotePath;
use drivemirror_graph::{listing, GraphError};
use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_429_is_retried_after_delay() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root/children"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/drive/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [common::file_json("a.txt", 1, None)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = listing::list_children(&client, &RemotePath::root())
        .await
        .expect("should succeed after 429s");
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_429_retry_budget_is_bounded() {
    let (server, client) = common::setup_drive_mock().await;
    let client = client.with_max_retries(1);

    Mock::given(method("GET"))
        .and(path("/drive/root/children"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let result = listing::list_children(&client, &RemotePath::root()).await;
    assert!(matches!(result, Err(GraphError::TooManyRequests { .. })));
}

#[tokio::test]
async fn test_401_is_not_retried() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/root/children"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = listing::list_children(&client, &RemotePath::root()).await;
    assert!(matches!(result, Err(GraphError::Unauthorized(_))));
}
