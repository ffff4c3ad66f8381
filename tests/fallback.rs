mod common;

use std::time::Duration;

use common::{analysis, call, dispatcher_with};
use mcp_analysis::core::config::{LlmConfig, ServerConfig};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CODE: &str = "let token = \"abc123\";\n";

fn config(server: &MockServer, timeout: Duration) -> ServerConfig {
    ServerConfig {
        llm: LlmConfig {
            endpoint: Some(format!("{}/v1/chat/completions", server.uri())),
            api_key: Some("sk-test".to_string()),
            timeout,
            ..LlmConfig::default()
        },
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn test_model_reply_is_used() {
    let server = MockServer::start().await;
    let reply = json!({ "summary": "Hard-coded token", "issues": [], "suggestions": ["Use a secret store"] });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": reply.to_string() } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let d = dispatcher_with(config(&server, Duration::from_secs(5)));
    let resp = call(&d, 1, "review_code", json!({ "code": CODE, "language": "rust" })).await;

    let review = analysis(&resp);
    assert_eq!(review["status"], "ai_analysis");
    assert_eq!(review["summary"], "Hard-coded token");
    assert_eq!(review["language"], "rust");
    assert!(review.get("fallback_reason").is_none());
}

#[tokio::test]
async fn test_server_error_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let d = dispatcher_with(config(&server, Duration::from_secs(5)));
    let resp = call(&d, 2, "review_code", json!({ "code": CODE })).await;

    assert!(resp.get("error").is_none());
    let review = analysis(&resp);
    assert_eq!(review["status"], "mock_analysis");
    assert_eq!(review["fallback_reason"], "request_failed");
    assert_eq!(review["issues"][0]["type"], "hardcoded_secret");
}

#[tokio::test]
async fn test_garbage_body_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let d = dispatcher_with(config(&server, Duration::from_secs(5)));
    let resp = call(&d, 3, "review_code", json!({ "code": CODE })).await;

    let review = analysis(&resp);
    assert_eq!(review["status"], "mock_analysis");
    assert_eq!(review["fallback_reason"], "request_failed");
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "choices": [{ "message": { "content": "late" } }] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let d = dispatcher_with(config(&server, Duration::from_millis(200)));
    let resp = call(&d, 4, "review_code", json!({ "code": CODE })).await;

    assert_eq!(resp["id"], 4);
    let review = analysis(&resp);
    assert_eq!(review["status"], "mock_analysis");
    assert_eq!(review["fallback_reason"], "timeout");
}
