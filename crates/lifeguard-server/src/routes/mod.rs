//! HTTP route handlers for the `Lifeguard` API.
//!
//! Every path parameter named `{id}` is an identifier-vault token. Handlers
//! resolve it through [`AppState::resolve`] before touching the storage
//! layer, so client-supplied text never reaches a command line.

pub mod data;
pub mod info;
pub mod keys;
pub mod notifications;
pub mod pools;
pub mod scrub;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware as axum_mw;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Prefix shared by every API route.
pub const API_PREFIX: &str = "/api/v0";

/// In-flight requests per privileged route (key, mount and scrub).
const PRIVILEGED_CONCURRENCY: usize = 4;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // State-changing operations run under the escalation wrapper.
    let privileged = Router::new()
        .merge(data::actions_router())
        .merge(keys::router())
        .merge(scrub::router())
        .layer(ConcurrencyLimitLayer::new(PRIVILEGED_CONCURRENCY));

    let authenticated = Router::new()
        .merge(pools::router())
        .merge(data::router())
        .merge(notifications::router())
        .merge(info::router())
        .merge(privileged)
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let api = authenticated.merge(info::health_router());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
