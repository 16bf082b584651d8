//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and its mapping
//! onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use smartcart_core::ports::PortError;
use tracing::error;

use crate::config::ConfigError;

/// Errors surfaced by the service binaries and HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The environment was incomplete or malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A core port or service failed.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// An upstream API (model provider, product data) failed.
    #[error("{0}")]
    Upstream(String),

    /// Pool setup or migrations failed.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Socket binding or serving failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// Maps a port error from an upstream-backed call, treating unexpected failures as 502.
    pub fn upstream(err: PortError) -> Self {
        match err {
            PortError::Unexpected(msg) => ApiError::Upstream(msg),
            other => ApiError::Port(other),
        }
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Port(PortError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Port(PortError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Port(PortError::Unauthorized) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            ApiError::Port(PortError::Unexpected(msg)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(%status, error = %message, "Request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
