//! Server information routes: `/info`, `/health`

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

pub const PRODUCT: &str = "Lifeguard";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/info", get(info))
}

/// Unauthenticated liveness probe.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoResponse {
    pub product: &'static str,
    pub version: &'static str,
    #[serde(rename = "ZFSVersion")]
    pub zfs_version: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn info(State(state): State<Arc<AppState>>) -> Result<Json<InfoResponse>, AppError> {
    Ok(Json(InfoResponse {
        product: PRODUCT,
        version: env!("CARGO_PKG_VERSION"),
        zfs_version: state.zfs().version().await?,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
