//! Encryption key routes: `/key/{id}/load`, `/key/{id}/unload`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/key/{id}/load", post(load_key))
        .route("/key/{id}/unload", post(unload_key))
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoadKeyRequest {
    pub passphrase: Zeroizing<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Load a dataset's key. The passphrase only ever travels on the child's
/// standard input.
async fn load_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<LoadKeyRequest>,
) -> Result<StatusCode, AppError> {
    let name = state.resolve(&id)?;
    if body.passphrase.is_empty() {
        return Err(AppError::BadRequest("missing passphrase".to_owned()));
    }

    // A key that was already loaded counts as success.
    state.zfs().load_key(&name, &body.passphrase).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unload_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let name = state.resolve(&id)?;
    state.zfs().unload_key(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
