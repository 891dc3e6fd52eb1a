//! `Lifeguard` HTTP server.
//!
//! Wires the core library into an Axum router that serves the JSON API at
//! `/api/v0/*` for the web UI. The process runs with enough privilege to
//! drive `zpool` and `zfs`; the API is the only way in.

pub mod config;
pub mod error;
pub mod hardening;
pub mod middleware;
pub mod routes;
pub mod state;
