//! Syslog backend for the notification sink.
//!
//! Writes RFC 3164 datagrams to the local syslog socket under the daemon
//! facility. Reaching syslog is optional: if the socket cannot be opened at
//! startup the caller logs a warning and runs without this backend.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::net::UnixDatagram;

use crate::error::NotifyError;
use crate::notify::{Notification, NotificationBackend};

/// Syslog facility code for system daemons.
const FACILITY_DAEMON: u8 = 3;

const TAG: &str = "lifeguard";

/// Forwards notifications to a local syslog socket.
pub struct SyslogBackend {
    path: PathBuf,
    socket: UnixDatagram,
}

impl SyslogBackend {
    /// Connect to the syslog socket at `path` (usually `/dev/log`).
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Connect`] if the socket cannot be opened.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, NotifyError> {
        let path = path.as_ref().to_path_buf();
        let connect_error = |e: std::io::Error| NotifyError::Connect {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let socket = UnixDatagram::unbound().map_err(connect_error)?;
        socket.connect(&path).map_err(connect_error)?;
        Ok(Self { path, socket })
    }

    fn format(notification: &Notification) -> String {
        let priority = FACILITY_DAEMON * 8 + notification.severity.syslog_code();
        format!(
            "<{priority}>{} {TAG}[{}]: Notification {notification}",
            Local::now().format("%b %e %H:%M:%S"),
            std::process::id(),
        )
    }
}

#[async_trait::async_trait]
impl NotificationBackend for SyslogBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "syslog"
    }

    async fn forward(&self, notification: &Notification) -> Result<(), NotifyError> {
        let line = Self::format(notification);
        self.socket
            .send(line.as_bytes())
            .await
            .map_err(|e| NotifyError::BackendFailure {
                name: self.name().to_owned(),
                reason: format!("send to '{}' failed: {e}", self.path.display()),
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for SyslogBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyslogBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
