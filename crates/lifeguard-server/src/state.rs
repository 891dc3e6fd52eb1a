//! Shared application state for the `Lifeguard` server.

use std::sync::Arc;

use zeroize::Zeroizing;

use lifeguard_core::error::VaultError;
use lifeguard_core::exec::CommandRunner;
use lifeguard_core::history::PoolHistory;
use lifeguard_core::monitor::PoolMonitor;
use lifeguard_core::notify::NotificationSink;
use lifeguard_core::vault::IdentifierVault;
use lifeguard_core::zfs::{Zfs, ZfsConfig};

use crate::config::ServerConfig;
use crate::error::AppError;

/// Shared state passed to all route handlers via Axum's `State` extractor.
pub struct AppState {
    /// Token table for every identifier sent to clients.
    pub vault: Arc<IdentifierVault>,
    /// Storage facade wrapped in change tracking.
    pub monitor: Arc<PoolMonitor>,
    api_token: Zeroizing<String>,
}

impl AppState {
    pub fn new(vault: Arc<IdentifierVault>, monitor: Arc<PoolMonitor>, api_token: String) -> Self {
        Self {
            vault,
            monitor,
            api_token: Zeroizing::new(api_token),
        }
    }

    /// Assemble the state from configuration, a command runner and the
    /// identifier key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::EmptyKey`] if `session_key` is empty.
    pub fn build(
        config: &ServerConfig,
        runner: Arc<dyn CommandRunner>,
        session_key: &[u8],
    ) -> Result<Self, VaultError> {
        let vault = Arc::new(IdentifierVault::new(session_key)?);
        let zfs = Zfs::new(
            runner,
            Arc::clone(&vault),
            ZfsConfig {
                tools: config.tools.clone(),
                sudo: config.sudo_path.clone(),
                properties: config.properties.clone(),
                dump_headers: config.debug_parse,
            },
        );
        let monitor = PoolMonitor::new(
            Arc::new(zfs),
            Arc::new(PoolHistory::new()),
            Arc::new(NotificationSink::new(config.notification_limit)),
        );
        Ok(Self::new(vault, Arc::new(monitor), config.api_token.clone()))
    }

    pub fn zfs(&self) -> &Zfs {
        self.monitor.zfs()
    }

    /// Identifier behind a client-supplied token.
    ///
    /// # Errors
    ///
    /// Any token this process did not mint is an invalid id.
    pub fn resolve(&self, token: &str) -> Result<String, AppError> {
        self.vault.resolve(token).ok_or_else(AppError::invalid_id)
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("vault", &self.vault)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}
