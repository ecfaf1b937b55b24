//! Optional API-key guard for the versioned routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

/// Accepts `Authorization: Bearer <key>` or `x-api-key: <key>`.
pub(crate) async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let verdict = match presented_key(request.headers()) {
        None => Err(ApiError::MissingCredential),
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiError::InvalidCredential),
    };
    if let Err(err) = verdict {
        tracing::warn!(path = %request.uri().path(), error = %err, "rejected unauthenticated request");
        return Err(err);
    }
    Ok(next.run(request).await)
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}
