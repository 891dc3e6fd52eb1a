//! Core library for `Lifeguard`.
//!
//! Contains the `zpool status` parser, the command executor and argument
//! sanitizer, the HMAC identifier vault, the property fetcher, pool history
//! with change detection, and the notification sink. This crate knows
//! nothing about HTTP; the server crate wires these pieces into routes.

pub mod error;
pub mod exec;
pub mod history;
pub mod monitor;
pub mod notify;
#[cfg(unix)]
pub mod notify_syslog;
pub mod pool;
pub mod properties;
pub mod sanitize;
pub mod status;
pub mod vault;
pub mod zfs;
