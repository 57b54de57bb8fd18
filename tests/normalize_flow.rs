//! End-to-end normalization of a list Service Request against a mock
//! upstream.

mod common;

use common::{list_sr, provider, service, PipelineFixture};
use serde_json::json;
use sr_pipeline::config::ConfigSnapshot;
use sr_pipeline::{ResponseKey, RunStatus};
use std::collections::BTreeMap;

fn snapshot() -> ConfigSnapshot {
    ConfigSnapshot {
        providers: vec![provider(1, "acme")],
        services: vec![service(
            1,
            "catalog",
            vec![
                ResponseKey::mapped("id", "id"),
                ResponseKey::mapped("title", "title"),
            ],
        )],
        service_requests: vec![list_sr(1, "products", "/v1/products", "results")],
    }
}

#[tokio::test]
async fn list_run_normalizes_every_item_and_injects_provider() {
    let mut fixture = PipelineFixture::new(snapshot()).await;
    let mock = fixture
        .server
        .mock("GET", "/v1/products")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results":[{"id":1,"title":"A"},{"id":2,"title":"B"}]}"#)
        .create_async()
        .await;

    let response = fixture.pipeline.run(1, BTreeMap::new()).await;

    mock.assert_async().await;
    assert_eq!(response.status, RunStatus::Success);
    assert_eq!(
        response.request_data,
        json!([
            {"id": 1, "title": "A", "provider": "acme"},
            {"id": 2, "title": "B", "provider": "acme"}
        ])
    );
    assert_eq!(response.provider.as_deref(), Some("acme"));
    assert_eq!(response.request_service.as_deref(), Some("products"));
}

#[tokio::test]
async fn missing_list_key_yields_validation_error_naming_the_key() {
    let mut fixture = PipelineFixture::new(snapshot()).await;
    let _mock = fixture
        .server
        .mock("GET", "/v1/products")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": []}"#)
        .create_async()
        .await;

    let response = fixture.pipeline.run(1, BTreeMap::new()).await;

    assert_eq!(response.status, RunStatus::Error);
    let message = response.message.unwrap();
    assert!(message.contains("results"), "message: {message}");
    assert!(message.contains("products"), "message: {message}");
}

#[tokio::test]
async fn empty_list_is_a_success_with_zero_items() {
    let mut fixture = PipelineFixture::new(snapshot()).await;
    let _mock = fixture
        .server
        .mock("GET", "/v1/products")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results": []}"#)
        .create_async()
        .await;

    let response = fixture.pipeline.run(1, BTreeMap::new()).await;

    assert_eq!(response.status, RunStatus::Success);
    assert!(response.items().is_empty());
}

#[tokio::test]
async fn upstream_error_status_comes_back_as_error_result_with_echoes() {
    let mut fixture = PipelineFixture::new(snapshot()).await;
    let _mock = fixture
        .server
        .mock("GET", "/v1/products")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "overloaded"}"#)
        .create_async()
        .await;

    let response = fixture.pipeline.run(1, BTreeMap::new()).await;

    assert_eq!(response.status, RunStatus::Error);
    assert!(response.message.unwrap().contains("503"));
    let raw = response.raw_response_echo.expect("raw response echoed");
    assert!(raw["body"].as_str().unwrap().contains("overloaded"));
}
