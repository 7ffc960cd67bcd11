use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, Uri},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::chat::ModelList;
use crate::AppState;

pub const SERVICE_NAME: &str = "chatbridge";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

// ── Handlers ─────────────────────────────────────────────────

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
    })
}

/// `GET /v1/models`: every client-facing model name we accept.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(state.models.to_model_list())
}

pub async fn not_found(method: Method, uri: Uri) -> AppError {
    AppError::NotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
