//! Scrub routes: `/pool/{id}/scrub/start`, `/pool/{id}/scrub/pause`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pool/{id}/scrub/start", post(start))
        .route("/pool/{id}/scrub/pause", post(pause))
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let pool = state.resolve(&id)?;
    state.zfs().scrub(&pool).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn pause(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let pool = state.resolve(&id)?;
    state.zfs().pause_scrub(&pool).await?;
    Ok(StatusCode::NO_CONTENT)
}
