use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::models::chat::{ErrorBody, ErrorEnvelope};

/// Every error a client can see. All of them render as the same
/// `{"error": {...}}` envelope with `type = "invalid_request_error"`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<&'static str>,
    },

    #[error("upstream error ({status}): {message}")]
    Upstream { status: StatusCode, message: String },

    #[error("request body exceeds size limit")]
    PayloadTooLarge,

    #[error("Invalid URL ({method} {path})")]
    NotFound { method: String, path: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid_param(param: &'static str, message: impl Into<String>) -> Self {
        AppError::InvalidRequest {
            message: message.into(),
            param: Some(param),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Upstream { status, .. } => *status,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        let (message, param, code) = match self {
            AppError::InvalidRequest { message, param } => {
                (message.clone(), param.map(str::to_string), None)
            }
            AppError::Upstream { status, message } => {
                (message.clone(), None, Some(status.as_u16()))
            }
            AppError::PayloadTooLarge | AppError::NotFound { .. } => {
                (self.to_string(), None, None)
            }
            AppError::Internal(_) => ("internal server error".to_string(), None, None),
        };

        ErrorEnvelope {
            error: ErrorBody {
                message,
                error_type: "invalid_request_error".into(),
                param,
                code,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(e) => tracing::error!("Internal error: {:#}", e),
            AppError::Upstream { status, message } => {
                tracing::warn!(%status, "Upstream error: {}", message)
            }
            _ => tracing::debug!("Rejected request: {}", self),
        }

        (self.status(), Json(self.to_envelope())).into_response()
    }
}
