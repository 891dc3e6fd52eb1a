//! Pool routes: `/pools`, `/pool/{id}`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use lifeguard_core::pool::Pool;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pools", get(list_pools))
        .route("/pool/{id}", get(pool_detail))
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Every pool with its status and own property row.
async fn list_pools(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Pool>>, AppError> {
    Ok(Json(state.monitor.pools().await?))
}

/// One pool with its datasets and snapshots.
async fn pool_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Pool>, AppError> {
    let name = state.resolve(&id)?;
    Ok(Json(state.monitor.pool(&name).await?))
}
