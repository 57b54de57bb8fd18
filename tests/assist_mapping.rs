//! AI key-mapping assistant against a mock backend.

use serde_json::json;
use sr_pipeline::{AiBackendKind, Error, HttpTransport, KeyMappingAssistant};

fn chat_completion(content: &str) -> String {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
    .to_string()
}

#[tokio::test]
async fn proposal_round_trips_through_the_openai_wire_shape() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_completion(
            r#"{"mapping": {"headline": "title", "cost": "price"}, "new_keys": ["sku"]}"#,
        ))
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let assistant = KeyMappingAssistant::new(AiBackendKind::OpenAi)
        .api_key("test-key")
        .base_url_override(server.url());

    let proposal = assistant
        .propose(
            &transport,
            &json!({"headline": "x", "cost": 1, "sku": "A-1"}),
            &["title".to_string(), "price".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(proposal.mapping.get("headline").map(String::as_str), Some("title"));
    assert_eq!(proposal.mapping.get("cost").map(String::as_str), Some("price"));
    assert_eq!(proposal.new_keys, vec!["sku".to_string()]);
}

#[tokio::test]
async fn duplicate_target_is_demoted_to_new_key() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_completion(
            r#"{"mapping": {"headline": "title", "name": "title"}, "new_keys": []}"#,
        ))
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let assistant = KeyMappingAssistant::new(AiBackendKind::DeepSeek)
        .api_key("test-key")
        .base_url_override(server.url());

    let proposal = assistant
        .propose(&transport, &json!({}), &["title".to_string()])
        .await
        .unwrap();

    // Exactly one raw key keeps the target; the other becomes a new key.
    assert_eq!(proposal.mapping.len(), 1);
    assert_eq!(proposal.new_keys.len(), 1);
    let mapped: Vec<&str> = proposal.mapping.keys().map(String::as_str).collect();
    assert!(mapped == vec!["headline"] || mapped == vec!["name"]);
}

#[tokio::test]
async fn backend_failure_surfaces_with_raw_diagnostic() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "rate limited"}}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let assistant = KeyMappingAssistant::new(AiBackendKind::Grok)
        .api_key("test-key")
        .base_url_override(server.url());

    let error = assistant
        .propose(&transport, &json!({}), &[])
        .await
        .unwrap_err();

    match error {
        Error::AiBackend { backend, raw, .. } => {
            assert_eq!(backend, "grok");
            assert!(raw.unwrap().contains("rate limited"));
        }
        other => panic!("expected AiBackend error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_completion_never_degrades_to_an_empty_mapping() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_completion(""))
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let assistant = KeyMappingAssistant::new(AiBackendKind::OpenAi)
        .api_key("test-key")
        .base_url_override(server.url());

    let error = assistant
        .propose(&transport, &json!({}), &[])
        .await
        .unwrap_err();
    assert!(matches!(error, Error::AiBackend { .. }));
    assert!(error.to_string().contains("empty completion"));
}

#[tokio::test]
async fn gemini_wire_shape_parses_too() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock(
            "POST",
            mockito::Matcher::Regex(r"^/models/.+:generateContent".to_string()),
        )
        .match_query(mockito::Matcher::UrlEncoded(
            "key".into(),
            "gemini-key".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "candidates": [{
                    "content": { "parts": [{
                        "text": "```json\n{\"mapping\": {\"headline\": \"title\"}, \"new_keys\": []}\n```"
                    }] }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let assistant = KeyMappingAssistant::new(AiBackendKind::Gemini)
        .api_key("gemini-key")
        .base_url_override(server.url());

    let proposal = assistant
        .propose(&transport, &json!({"headline": "x"}), &["title".to_string()])
        .await
        .unwrap();
    assert_eq!(proposal.mapping.get("headline").map(String::as_str), Some("title"));
}
