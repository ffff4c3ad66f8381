mod common;

use std::sync::atomic::AtomicU64;

use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use mcp_analysis::core::server::routes;
use serde_json::{Value, json};

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(common::dispatcher()))
                .app_data(web::Data::new(AtomicU64::new(0)))
                .configure(routes),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_post_mcp_endpoint() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(header::ContentType::json())
        .set_payload(r#"{"jsonrpc":"2.0","id":"h1","method":"tools/list"}"#)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], "h1");
    assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 3);
}

#[actix_rt::test]
async fn test_malformed_body_is_parse_error() {
    let app = app!();
    let req = test::TestRequest::post().uri("/").set_payload("{oops").to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[actix_rt::test]
async fn test_notification_is_accepted() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/mcp")
        .set_payload(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
}

#[actix_rt::test]
async fn test_health() {
    let app = app!();
    let req = test::TestRequest::get().uri("/health").to_request();

    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "mcp-analysis-server");
    assert_eq!(body["tools"], 3);
}

#[actix_rt::test]
async fn test_metrics_counts_requests() {
    let app = app!();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/mcp")
            .set_payload(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string())
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["requests_total"], 2);
}

#[actix_rt::test]
async fn test_options_preflight() {
    let app = app!();
    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/mcp")
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers().get(header::ALLOW).unwrap(), "GET, POST, OPTIONS");
}
