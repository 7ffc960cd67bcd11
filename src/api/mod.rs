use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::proxy;
use crate::AppState;

pub mod handlers;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the public router. Unknown paths, and known paths hit with the
/// wrong method, get the 404 error envelope.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/health",
            get(handlers::health).fallback(handlers::not_found),
        )
        .route(
            "/v1/models",
            get(handlers::list_models).fallback(handlers::not_found),
        )
        .route(
            "/v1/chat/completions",
            post(proxy::handler::chat_completions).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(request_id_middleware))
}

/// Middleware: injects a unique X-Request-Id into every response so clients
/// can correlate errors with proxy logs.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}
