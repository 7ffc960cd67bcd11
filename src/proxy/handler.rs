use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::chat::InboundRequest;
use crate::proxy::stream_bridge::reframe_sse_stream;
use crate::proxy::transform::{build_upstream_request, normalize_completion};
use crate::proxy::upstream::UpstreamClient;
use crate::AppState;

/// `POST /v1/chat/completions`
#[tracing::instrument(skip(state, body), fields(req_id = %uuid::Uuid::new_v4(), model = tracing::field::Empty))]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let start = Instant::now();

    // -- 1. Parse + validate --
    let body = body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
        _ => AppError::InvalidRequest {
            message: rejection.body_text(),
            param: None,
        },
    })?;
    let inbound = parse_inbound(&body)?;
    let client_model = inbound.model.clone();
    tracing::Span::current().record("model", client_model.as_str());

    // -- 2. Build upstream request --
    let upstream_req = build_upstream_request(inbound, &state.models);
    tracing::debug!(
        backend_model = %upstream_req.model,
        stream = upstream_req.stream,
        messages = upstream_req.messages.len(),
        "Dispatching to upstream"
    );

    // -- 3. Dispatch --
    let upstream_resp = state.upstream.send(&upstream_req).await?;

    // -- 4. Respond --
    if upstream_req.stream {
        tracing::info!(
            ttfb_ms = start.elapsed().as_millis() as u64,
            "Streaming response started"
        );
        return streaming_response(upstream_resp, client_model);
    }

    let upstream_body = UpstreamClient::read_json(upstream_resp).await?;
    let envelope = normalize_completion(&client_model, &upstream_body);
    tracing::info!(
        latency_ms = start.elapsed().as_millis() as u64,
        total_tokens = envelope.usage.total_tokens,
        "Completion served"
    );

    Ok(Json(envelope).into_response())
}

fn streaming_response(
    upstream_resp: reqwest::Response,
    client_model: String,
) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .body(reframe_sse_stream(upstream_resp, client_model))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {}", e)))
}

/// Validate the raw body and decode it. `model` is checked before
/// `messages`; the first failure wins.
pub fn parse_inbound(body: &[u8]) -> Result<InboundRequest, AppError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| AppError::InvalidRequest {
        message: format!("We could not parse the JSON body of your request: {}", e),
        param: None,
    })?;

    let Some(obj) = value.as_object() else {
        return Err(AppError::InvalidRequest {
            message: "request body must be a JSON object".into(),
            param: None,
        });
    };

    match obj.get("model") {
        Some(Value::String(m)) if !m.is_empty() => {}
        Some(Value::String(_)) => {
            return Err(AppError::invalid_param("model", "model must be a non-empty string"))
        }
        Some(_) => return Err(AppError::invalid_param("model", "model must be a string")),
        None => return Err(AppError::invalid_param("model", "you must provide a model parameter")),
    }

    match obj.get("messages") {
        Some(Value::Array(msgs)) if !msgs.is_empty() => {}
        Some(Value::Array(_)) => {
            return Err(AppError::invalid_param(
                "messages",
                "messages must contain at least one message",
            ))
        }
        Some(_) => return Err(AppError::invalid_param("messages", "messages must be an array")),
        None => {
            return Err(AppError::invalid_param(
                "messages",
                "you must provide a messages parameter",
            ))
        }
    }

    check_optional(obj.get("temperature"), "temperature", Value::is_number, "a number")?;
    check_optional(obj.get("max_tokens"), "max_tokens", is_u32, "a non-negative integer")?;
    check_optional(obj.get("stream"), "stream", Value::is_boolean, "a boolean")?;

    serde_json::from_value(value).map_err(|e| AppError::InvalidRequest {
        message: format!("invalid request body: {}", e),
        param: None,
    })
}

/// Absent and `null` are both fine; anything else must pass `accept`.
fn check_optional(
    field: Option<&Value>,
    param: &'static str,
    accept: fn(&Value) -> bool,
    expected: &str,
) -> Result<(), AppError> {
    match field {
        None | Some(Value::Null) => Ok(()),
        Some(v) if accept(v) => Ok(()),
        Some(_) => Err(AppError::invalid_param(
            param,
            format!("{param} must be {expected}"),
        )),
    }
}

fn is_u32(v: &Value) -> bool {
    v.as_u64().is_some_and(|n| u32::try_from(n).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param_of(body: &str) -> Option<&'static str> {
        match parse_inbound(body.as_bytes()) {
            Err(AppError::InvalidRequest { param, .. }) => param,
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected {body} to be rejected"),
        }
    }

    #[test]
    fn test_model_checks() {
        for body in [
            r#"{"messages":[{"role":"user","content":"hi"}]}"#,
            r#"{"model":"","messages":[{"role":"user","content":"hi"}]}"#,
            r#"{"model":4,"messages":[{"role":"user","content":"hi"}]}"#,
            r#"{"model":null,"messages":[{"role":"user","content":"hi"}]}"#,
        ] {
            assert_eq!(param_of(body), Some("model"), "{body}");
        }
    }

    #[test]
    fn test_messages_checks() {
        for body in [
            r#"{"model":"gpt-4"}"#,
            r#"{"model":"gpt-4","messages":[]}"#,
            r#"{"model":"gpt-4","messages":"hi"}"#,
            r#"{"model":"gpt-4","messages":{"role":"user"}}"#,
        ] {
            assert_eq!(param_of(body), Some("messages"), "{body}");
        }
    }

    #[test]
    fn test_model_checked_before_messages() {
        assert_eq!(param_of(r#"{}"#), Some("model"));
        assert_eq!(param_of(r#"{"model":"","messages":[]}"#), Some("model"));
    }

    #[test]
    fn test_optional_field_types() {
        let base = r#""model":"gpt-4","messages":[{"role":"user","content":"hi"}]"#;
        assert_eq!(param_of(&format!(r#"{{{base},"temperature":"hot"}}"#)), Some("temperature"));
        assert_eq!(param_of(&format!(r#"{{{base},"max_tokens":-1}}"#)), Some("max_tokens"));
        assert_eq!(param_of(&format!(r#"{{{base},"max_tokens":1.5}}"#)), Some("max_tokens"));
        assert_eq!(param_of(&format!(r#"{{{base},"stream":"yes"}}"#)), Some("stream"));
    }

    #[test]
    fn test_not_json_or_not_object() {
        assert_eq!(param_of("not json"), None);
        assert_eq!(param_of("[1,2]"), None);
    }

    #[test]
    fn test_valid_request_decodes() {
        let req = parse_inbound(
            br#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}],"temperature":null,"max_tokens":100,"stream":true,"top_p":0.9}"#,
        )
        .unwrap();
        assert_eq!(req.model, "gpt-4");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.temperature, None);
        assert_eq!(req.max_tokens, Some(100));
        assert_eq!(req.stream, Some(true));
    }
}
