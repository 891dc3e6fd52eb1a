//! Dataset and snapshot routes: `/data/{id}/*`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use lifeguard_core::pool::DataInfo;

use crate::error::AppError;
use crate::state::AppState;

/// Read-only dataset routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/data/{id}/info", get(info))
}

/// Mount and unmount.
pub fn actions_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/data/{id}/mount", post(mount))
        .route("/data/{id}/unmount", post(unmount))
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataInfo>, AppError> {
    let name = state.resolve(&id)?;
    Ok(Json(state.zfs().data_info(&name).await?))
}

async fn mount(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let name = state.resolve(&id)?;
    state.zfs().mount(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unmount(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let name = state.resolve(&id)?;
    state.zfs().unmount(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
