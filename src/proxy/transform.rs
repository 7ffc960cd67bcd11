//! Request and response reshaping between the client-facing schema and the
//! backend schema.

use serde_json::Value;

use crate::models::catalog::ModelMap;
use crate::models::chat::{
    completion_id, unix_now, AssistantMessage, CompletionChoice, CompletionEnvelope,
    InboundRequest, UpstreamRequest, Usage, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};

/// Resolve the backend model and materialize every optional field.
/// Expects an already-validated request.
pub fn build_upstream_request(inbound: InboundRequest, models: &ModelMap) -> UpstreamRequest {
    UpstreamRequest {
        model: models.resolve(&inbound.model).to_string(),
        messages: inbound.messages,
        temperature: inbound.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        // 0 is treated like "not set"
        max_tokens: inbound
            .max_tokens
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        stream: inbound.stream.unwrap_or(false),
    }
}

/// Rebuild a compliant completion envelope from whatever the backend sent.
///
/// Total over any JSON value: missing `choices`, `message` or `usage` (or
/// any field inside them) are replaced with defaults. `model` always echoes
/// the name the client asked for, not the backend id.
pub fn normalize_completion(client_model: &str, upstream: &Value) -> CompletionEnvelope {
    let choice = upstream.pointer("/choices/0");

    let content = choice
        .and_then(|c| c.pointer("/message/content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .unwrap_or("stop")
        .to_string();

    CompletionEnvelope {
        id: completion_id(),
        object: "chat.completion".into(),
        created: unix_now(),
        model: client_model.to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".into(),
                content,
            },
            finish_reason,
        }],
        usage: extract_usage(upstream.get("usage")),
    }
}

/// Counters that are missing, negative or fractional become 0. Some backends
/// encode integers as floats (`4.0`); those are accepted.
fn extract_usage(usage: Option<&Value>) -> Usage {
    let counter = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(token_count)
            .unwrap_or(0)
    };
    Usage {
        prompt_tokens: counter("prompt_tokens"),
        completion_tokens: counter("completion_tokens"),
        total_tokens: counter("total_tokens"),
    }
}

fn token_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}
