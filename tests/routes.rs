//! Router-level tests for the non-chat endpoints: health, model listing,
//! 404 handling and the response headers every route carries.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chatbridge::config::Config;
use chatbridge::{api, AppState};
use serde_json::Value;
use tower::ServiceExt;

fn app() -> axum::Router {
    let cfg = Config {
        upstream_url: "http://127.0.0.1:9/v1".into(),
        upstream_api_key: "sk-test".into(),
        ..Config::default()
    };
    api::router(Arc::new(AppState::from_config(cfg).unwrap()))
}

async fn call(method: Method, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let resp = app()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

#[tokio::test]
async fn test_health() {
    let (status, headers, body) = call(Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "chatbridge");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_list_models() {
    let (status, _, body) = call(Method::GET, "/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "list");

    let data = body["data"].as_array().unwrap();
    let ids: Vec<&str> = data.iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&"gpt-4"));
    assert!(ids.contains(&"gpt-3.5-turbo"));
    for card in data {
        assert_eq!(card["object"], "model");
        assert!(card["created"].as_i64().unwrap() > 0);
        assert_eq!(card["owned_by"], "chatbridge");
    }
}

#[tokio::test]
async fn test_unknown_route_is_404_envelope() {
    let (status, _, body) = call(Method::GET, "/v1/embeddings").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["message"], "Invalid URL (GET /v1/embeddings)");
    assert!(body["error"]["param"].is_null());
    assert!(body["error"]["code"].is_null());
}

#[tokio::test]
async fn test_wrong_method_on_known_path_is_404_envelope() {
    let (status, _, body) = call(Method::GET, "/v1/chat/completions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Invalid URL (GET /v1/chat/completions)");

    let (status, _, body) = call(Method::DELETE, "/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Invalid URL (DELETE /health)");
}

#[tokio::test]
async fn test_cors_is_permissive() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/v1/chat/completions")
                .header("origin", "https://example.com")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
