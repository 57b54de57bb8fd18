//! OAuth token acquisition and cache behavior across runs.

mod common;

use common::{list_sr, provider, service};
use sr_pipeline::auth::{OauthClientAuth, OauthConfig};
use sr_pipeline::config::ConfigSnapshot;
use sr_pipeline::{AuthConfig, Pipeline, ResponseKey, RunStatus};
use std::collections::BTreeMap;
use std::sync::Arc;

fn oauth_snapshot(token_url: String, expiry_skew_secs: i64) -> ConfigSnapshot {
    let mut p = provider(1, "acme");
    p.auth = AuthConfig::Oauth(OauthConfig {
        token_url,
        client_id: "client".to_string(),
        client_secret: "s3cret".to_string(),
        client_auth: OauthClientAuth::BasicHeader,
        scope: None,
        expiry_skew_secs,
    });
    ConfigSnapshot {
        providers: vec![p],
        services: vec![service(1, "catalog", vec![ResponseKey::mapped("id", "id")])],
        service_requests: vec![list_sr(1, "products", "/v1/products", "results")],
    }
}

#[tokio::test]
async fn two_runs_within_validity_acquire_exactly_one_token() {
    let mut server = mockito::Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/token")
        .match_body(mockito::Matcher::UrlEncoded(
            "grant_type".into(),
            "client_credentials".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "tok-1", "expires_in": 3600}"#)
        .expect(1)
        .create_async()
        .await;
    let data_mock = server
        .mock("GET", "/v1/products")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results": [{"id": 1}]}"#)
        .expect(2)
        .create_async()
        .await;

    let snapshot = oauth_snapshot(format!("{}/oauth/token", server.url()), 60);
    let pipeline = Pipeline::builder(Arc::new(snapshot))
        .base_url_override(server.url())
        .build()
        .unwrap();

    let first = pipeline.run(1, BTreeMap::new()).await;
    let second = pipeline.run(1, BTreeMap::new()).await;

    token_mock.assert_async().await;
    data_mock.assert_async().await;
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(second.status, RunStatus::Success);
}

#[tokio::test]
async fn expired_token_is_reacquired() {
    let mut server = mockito::Server::new_async().await;
    // expires_in 0: every run sees the cached token as already expired.
    let token_mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "tok-short", "expires_in": 0}"#)
        .expect(2)
        .create_async()
        .await;
    let _data_mock = server
        .mock("GET", "/v1/products")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results": []}"#)
        .expect(2)
        .create_async()
        .await;

    let snapshot = oauth_snapshot(format!("{}/oauth/token", server.url()), 60);
    let pipeline = Pipeline::builder(Arc::new(snapshot))
        .base_url_override(server.url())
        .build()
        .unwrap();

    pipeline.run(1, BTreeMap::new()).await;
    pipeline.run(1, BTreeMap::new()).await;

    token_mock.assert_async().await;
}

#[tokio::test]
async fn failed_token_request_aborts_the_run_with_diagnostics() {
    let mut server = mockito::Server::new_async().await;
    let _token_mock = server
        .mock("POST", "/oauth/token")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "invalid_client"}"#)
        .create_async()
        .await;
    let data_mock = server
        .mock("GET", "/v1/products")
        .expect(0)
        .create_async()
        .await;

    let snapshot = oauth_snapshot(format!("{}/oauth/token", server.url()), 60);
    let pipeline = Pipeline::builder(Arc::new(snapshot))
        .base_url_override(server.url())
        .build()
        .unwrap();

    let response = pipeline.run(1, BTreeMap::new()).await;

    data_mock.assert_async().await;
    assert_eq!(response.status, RunStatus::Error);
    let message = response.message.unwrap();
    assert!(message.contains("Oauth"), "message: {message}");
    // The echoed token request never leaks the client secret.
    let echo = serde_json::to_string(&response.api_request_echo).unwrap();
    assert!(!echo.contains("s3cret"));
    assert!(response.raw_response_echo.is_some());
}
