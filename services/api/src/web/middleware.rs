//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use smartcart_core::ports::PortError;
use std::sync::Arc;
use tracing::warn;

use crate::error::ApiError;
use crate::web::state::AppState;

/// Reads the access token from `Authorization: Bearer ...` or the `session` cookie.
pub fn access_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    bearer.or_else(|| {
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())?
            .split(';')
            .find_map(|c| c.trim().strip_prefix("session="))
            .filter(|t| !t.is_empty())
    })
}

/// Middleware that validates the access token and extracts the `User`.
///
/// If valid, inserts the user into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = access_token(req.headers()).map(str::to_string) else {
        return ApiError::Port(PortError::Unauthorized).into_response();
    };

    let user = match state.db.validate_auth_session(&token).await {
        Ok(user) => user,
        Err(PortError::Unauthorized) => {
            return ApiError::Port(PortError::Unauthorized).into_response();
        }
        Err(e) => {
            warn!("Failed to validate auth session: {}", e);
            return ApiError::Port(e).into_response();
        }
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}
