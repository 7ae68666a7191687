use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::gateway::GatewayError;
use crate::ranking::pipeline::PipelineError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    BackendTimeout(String),

    #[error("{0}")]
    SecondaryBackend(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Input(msg) => AppError::Input(msg),
            PipelineError::Gateway(e @ GatewayError::Timeout { .. }) => {
                AppError::BackendTimeout(e.to_string())
            }
            PipelineError::Gateway(e @ GatewayError::Secondary { .. }) => {
                AppError::SecondaryBackend(e.to_string())
            }
            PipelineError::Gateway(e) => AppError::BackendUnavailable(e.to_string()),
            PipelineError::Internal(e) => AppError::Internal(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Input(msg) => (StatusCode::BAD_REQUEST, "INPUT_ERROR", msg.clone()),
            AppError::BackendUnavailable(msg) => {
                tracing::error!("Backend unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BACKEND_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::BackendTimeout(msg) => {
                tracing::error!("Backend timeout: {msg}");
                (StatusCode::GATEWAY_TIMEOUT, "BACKEND_TIMEOUT", msg.clone())
            }
            AppError::SecondaryBackend(msg) => {
                tracing::error!("Secondary backend failure: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "SECONDARY_BACKEND_FAILURE",
                    msg.clone(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Turns a handler panic caught by `CatchPanicLayer` into the INTERNAL_ERROR body.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
