//! HTTP client for the backend's `/chat/completions` endpoint.
//! No retries: a failed call is reported to the client as-is.
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::chat::UpstreamRequest;

pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    header_timeout: Option<Duration>,
}

impl UpstreamClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        header_timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            header_timeout,
        })
    }

    pub fn from_config(cfg: &crate::config::Config) -> anyhow::Result<Self> {
        Self::new(
            cfg.chat_completions_url(),
            cfg.upstream_api_key.clone(),
            cfg.upstream_timeout,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST the request and wait for response headers. Non-2xx responses are
    /// turned into [`AppError::Upstream`] here so callers only ever see a
    /// successful response whose body is still unread.
    pub async fn send(&self, request: &UpstreamRequest) -> Result<reqwest::Response, AppError> {
        let pending = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send();

        let result = match self.header_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(res) => res,
                Err(_) => {
                    tracing::error!(timeout = ?limit, "Upstream request timed out");
                    return Err(AppError::Upstream {
                        status: StatusCode::GATEWAY_TIMEOUT,
                        message: "upstream request timed out".into(),
                    });
                }
            },
            None => pending.await,
        };

        let resp = result.map_err(|e| {
            tracing::warn!("Upstream request failed: {}", e);
            AppError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "upstream service unavailable".into(),
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.bytes().await.unwrap_or_default();
        Err(upstream_failure(status.as_u16(), &body))
    }

    /// Read a buffered (non-streaming) response body as JSON.
    pub async fn read_json(resp: reqwest::Response) -> Result<Value, AppError> {
        let bytes = resp.bytes().await.map_err(|e| {
            tracing::warn!("Upstream body read failed: {}", e);
            AppError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "upstream response could not be read".into(),
            }
        })?;

        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!("Upstream returned invalid JSON: {}", e);
            AppError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "upstream returned an invalid response".into(),
            }
        })
    }
}

/// Map a non-2xx upstream reply onto the client error envelope, keeping the
/// upstream's status and message when it gave us one.
pub fn upstream_failure(status: u16, body: &[u8]) -> AppError {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .as_ref()
        .and_then(upstream_error_message)
        .unwrap_or_else(|| format!("upstream request failed with status {}", status.as_u16()));

    AppError::Upstream { status, message }
}

/// Backends report errors as `{"error":{"message"}}`, `{"error":"..."}`,
/// `{"message"}` or `{"detail"}`.
fn upstream_error_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.get("error"),
        body.get("message"),
        body.get("detail"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            model: "mistral-large-latest".into(),
            messages: vec![ChatMessage(json!({"role": "user", "content": "hi"}))],
            temperature: 0.7,
            max_tokens: 2048,
            stream: false,
        }
    }

    #[test]
    fn test_error_message_extraction() {
        let cases = [
            (json!({"error": {"message": "bad key"}}), Some("bad key")),
            (json!({"error": "quota"}), Some("quota")),
            (json!({"message": "nope"}), Some("nope")),
            (json!({"detail": "missing field"}), Some("missing field")),
            (json!({"error": {"code": 1}}), None),
            (json!({"message": ""}), None),
        ];
        for (body, expected) in cases {
            assert_eq!(upstream_error_message(&body).as_deref(), expected, "{body}");
        }
    }

    #[test]
    fn test_failure_without_body_uses_generic_message() {
        match upstream_failure(503, b"<html>down</html>") {
            AppError::Upstream { status, message } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "upstream request failed with status 503");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_sets_bearer_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "mistral-large-latest", "max_tokens": 2048})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = UpstreamClient::new(
            format!("{}/v1/chat/completions", mock_server.uri()),
            "sk-test",
            None,
        )
        .unwrap();

        let resp = client.send(&request()).await.unwrap();
        let body = UpstreamClient::read_json(resp).await.unwrap();
        assert_eq!(body, json!({"choices": []}));
    }

    #[tokio::test]
    async fn test_send_maps_non_2xx() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})),
            )
            .mount(&mock_server)
            .await;

        let client = UpstreamClient::new(format!("{}/chat/completions", mock_server.uri()), "bad", None).unwrap();

        match client.send(&request()).await {
            Err(AppError::Upstream { status, message }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_header_timeout_maps_to_504() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let client = UpstreamClient::new(
            format!("{}/chat/completions", mock_server.uri()),
            "k",
            Some(Duration::from_millis(100)),
        )
        .unwrap();

        match client.send(&request()).await {
            Err(AppError::Upstream { status, .. }) => assert_eq!(status, StatusCode::GATEWAY_TIMEOUT),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_upstream_maps_to_500() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let client = UpstreamClient::new("http://127.0.0.1:9/chat/completions", "k", None).unwrap();
        match client.send(&request()).await {
            Err(AppError::Upstream { status, message }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "upstream service unavailable");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
