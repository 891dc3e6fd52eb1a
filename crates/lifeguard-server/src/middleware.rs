//! Authentication middleware for `Lifeguard`.
//!
//! Every API route except `/health` requires `Authorization: Bearer <token>`
//! matching the configured API token. The comparison is constant-time.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::state::AppState;

/// Middleware that validates the bearer token.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(presented) = presented else {
        return unauthorized("missing bearer token");
    };

    let expected = state.api_token().as_bytes();
    if bool::from(presented.as_bytes().ct_eq(expected)) {
        next.run(req).await
    } else {
        debug!(path = %req.uri().path(), "rejected request with wrong token");
        unauthorized("invalid token")
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({"error": "unauthorized", "message": message})),
    )
        .into_response()
}
