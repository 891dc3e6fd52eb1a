//! `Lifeguard` server entry point.
//!
//! Loads configuration, hardens the process, builds the executor and the
//! storage facade, then starts the Axum HTTP server with graceful shutdown.
//! A background poller refreshes every pool so notifications fire even when
//! no client is watching; it is cancelled on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use lifeguard_core::exec::{CommandRunner, ExecConfig, Executor};
use lifeguard_core::monitor::PoolMonitor;

use lifeguard_server::config::ServerConfig;
use lifeguard_server::hardening;
use lifeguard_server::routes;
use lifeguard_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The key and the API token are read below; no core dumps from here on.
    apply_hardening();

    let config = ServerConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Lifeguard starting");

    let state = build_app_state(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_handle = if config.poll_interval_secs > 0 {
        let monitor = Arc::clone(&state.monitor);
        let mut rx = shutdown_rx.clone();
        let interval_secs = config.poll_interval_secs;
        Some(tokio::spawn(async move {
            pool_refresh_worker(monitor, &mut rx, interval_secs).await;
        }))
    } else {
        info!("background pool refresh disabled");
        None
    };

    let app = routes::build_router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "Lifeguard server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    if let Some(handle) = poller_handle {
        info!("waiting for background workers to stop");
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }

    info!("Lifeguard server stopped");
    Ok(())
}

/// Build the shared application state.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    // Without the timeout utility no command could be bounded.
    let executor = Executor::new(ExecConfig {
        timeout_path: config.timeout_path.clone(),
        timeout: config.exec_timeout.clone(),
        log_commands: config.debug_exec,
    })
    .context("cannot run storage commands")?;
    let runner: Arc<dyn CommandRunner> = Arc::new(executor);

    let session_key = match &config.session_key {
        Some(key) => key.clone(),
        None => {
            warn!("LIFEGUARD_SESSION_KEY not set, identifier tokens change on every restart");
            random_key()
        }
    };

    let state = AppState::build(config, runner, &session_key)
        .context("failed to initialise identifier vault")?;

    if config.syslog {
        register_syslog(&state, config).await;
    }

    Ok(Arc::new(state))
}

/// 32 bytes of OS randomness from two UUID v4s.
fn random_key() -> Vec<u8> {
    let a = uuid::Uuid::new_v4();
    let b = uuid::Uuid::new_v4();
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(a.as_bytes());
    key.extend_from_slice(b.as_bytes());
    key
}

#[cfg(unix)]
async fn register_syslog(state: &AppState, config: &ServerConfig) {
    use lifeguard_core::notify_syslog::SyslogBackend;

    match SyslogBackend::connect(&config.syslog_path) {
        Ok(backend) => {
            state.monitor.sink().add_backend(Arc::new(backend)).await;
            info!(path = %config.syslog_path.display(), "syslog notification backend registered");
        }
        Err(e) => warn!(error = %e, "syslog unavailable, notifications stay in memory"),
    }
}

#[cfg(not(unix))]
async fn register_syslog(_state: &AppState, _config: &ServerConfig) {
    warn!("syslog is only supported on unix");
}

/// Consecutive failed refreshes before the worker logs at `error`.
const REFRESH_ESCALATE_AFTER: u32 = 5;

/// Background worker that re-reads every pool's status on a fixed interval.
async fn pool_refresh_worker(
    monitor: Arc<PoolMonitor>,
    shutdown: &mut watch::Receiver<bool>,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    let mut consecutive_failures: u32 = 0;
    info!(interval_secs, "pool refresh worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match monitor.refresh_all().await {
                    Ok(emitted) => {
                        consecutive_failures = 0;
                        if emitted > 0 {
                            info!(emitted, "pool refresh found changes");
                        }
                    }
                    Err(e) => {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        if consecutive_failures >= REFRESH_ESCALATE_AFTER {
                            error!(error = %e, consecutive_failures, "pool refresh persistently failing");
                        } else {
                            warn!(error = %e, consecutive_failures, "pool refresh failed");
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("pool refresh worker shutting down");
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}

/// Apply process hardening before logging is initialized.
///
/// Uses `eprintln` because structured logging is not yet available.
#[allow(clippy::print_stderr)]
fn apply_hardening() {
    if let Err(e) = hardening::disable_core_dumps() {
        eprintln!("WARNING: failed to disable core dumps: {e}");
    }
}
