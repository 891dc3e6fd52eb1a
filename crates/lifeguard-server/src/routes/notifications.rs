//! Notification log route: `/notifications`

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use lifeguard_core::notify::Notification;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/notifications", get(list))
}

/// Every stored notification, oldest first.
async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<Notification>> {
    Json(state.monitor.sink().list().await)
}
