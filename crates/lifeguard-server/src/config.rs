//! Server configuration for `Lifeguard`.
//!
//! Loads configuration from `LIFEGUARD_*` environment variables. Anything
//! that would make the server act on the wrong binaries or without
//! authentication is a hard error; everything else has a default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use lifeguard_core::properties::ToolPaths;
use lifeguard_core::zfs::PropertyLists;

/// Fatal configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{var} must be set")]
    Missing { var: &'static str },

    /// A variable could not be parsed.
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    /// A tool path is not absolute.
    #[error("{var} must be an absolute path, got '{value}'")]
    RelativePath { var: &'static str, value: String },
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Bearer token every API request must present.
    pub api_token: String,
    /// Key for identifier tokens. `None` means a random key per process.
    pub session_key: Option<Vec<u8>>,
    /// Timeout utility wrapped around every command.
    pub timeout_path: PathBuf,
    /// Duration argument handed to the timeout utility (e.g. `10s`).
    pub exec_timeout: String,
    pub tools: ToolPaths,
    /// Escalation wrapper for mount, unmount and scrub. `None` runs them
    /// directly.
    pub sudo_path: Option<String>,
    /// Default property lists for pools, datasets and snapshots.
    pub properties: PropertyLists,
    /// Seconds between background pool refreshes; `0` disables the poller.
    pub poll_interval_secs: u64,
    /// Cap on stored notifications; `None` keeps all of them.
    pub notification_limit: Option<usize>,
    /// Mirror notifications to syslog.
    pub syslog: bool,
    pub syslog_path: PathBuf,
    /// Log the status parser's header map.
    pub debug_parse: bool,
    /// Log every executed command line.
    pub debug_exec: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LIFEGUARD_BIND_ADDR`: listener address (default: `127.0.0.1:5120`)
    /// - `LIFEGUARD_LOG_LEVEL`: log filter (default: `info`)
    /// - `LIFEGUARD_API_TOKEN`: bearer token for the API (required)
    /// - `LIFEGUARD_SESSION_KEY`: identifier token key (default: random)
    /// - `LIFEGUARD_TIMEOUT_PATH`: timeout utility (default: `/usr/bin/timeout`)
    /// - `LIFEGUARD_EXEC_TIMEOUT`: per-command limit (default: `10s`)
    /// - `LIFEGUARD_ZPOOL_PATH` / `LIFEGUARD_ZFS_PATH`: tool paths
    ///   (default: `/sbin/zpool`, `/sbin/zfs`)
    /// - `LIFEGUARD_SUDO_PATH`: escalation wrapper, `none` to disable
    ///   (default: `/usr/bin/sudo`)
    /// - `LIFEGUARD_PROPERTIES_POOL` / `_DATASET` / `_SNAPSHOT`: default
    ///   property lists
    /// - `LIFEGUARD_POLL_INTERVAL`: seconds between refreshes, `0` off
    ///   (default: `15`)
    /// - `LIFEGUARD_NOTIFICATION_LIMIT`: notification cap (default: none)
    /// - `LIFEGUARD_SYSLOG`: mirror notifications to syslog (default: `true`)
    /// - `LIFEGUARD_SYSLOG_PATH`: syslog socket (default: `/dev/log`)
    /// - `LIFEGUARD_DEBUG_PARSE` (or `LIFEGUARD_DEBUG=1`), `LIFEGUARD_DEBUG_EXEC`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a missing API token, unparsable values
    /// and relative tool paths.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());
        let flag = |var: &str, default: bool| {
            get(var).map_or(default, |v| v == "true" || v == "1")
        };

        let bind_addr = match get("LIFEGUARD_BIND_ADDR") {
            Some(addr) => addr.parse().map_err(|e| ConfigError::Invalid {
                var: "LIFEGUARD_BIND_ADDR",
                reason: format!("{e}"),
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 5120)),
        };

        let log_level = get("LIFEGUARD_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let api_token = get("LIFEGUARD_API_TOKEN").ok_or(ConfigError::Missing {
            var: "LIFEGUARD_API_TOKEN",
        })?;

        let session_key = get("LIFEGUARD_SESSION_KEY").map(String::into_bytes);

        let timeout_path = absolute(
            "LIFEGUARD_TIMEOUT_PATH",
            get("LIFEGUARD_TIMEOUT_PATH").unwrap_or_else(|| "/usr/bin/timeout".to_owned()),
        )?;

        let exec_timeout = get("LIFEGUARD_EXEC_TIMEOUT").unwrap_or_else(|| "10s".to_owned());
        if !is_duration(&exec_timeout) {
            return Err(ConfigError::Invalid {
                var: "LIFEGUARD_EXEC_TIMEOUT",
                reason: format!("'{exec_timeout}' is not a duration like 10s or 2m"),
            });
        }

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            zpool: path_string(
                "LIFEGUARD_ZPOOL_PATH",
                get("LIFEGUARD_ZPOOL_PATH").unwrap_or(defaults.zpool),
            )?,
            zfs: path_string(
                "LIFEGUARD_ZFS_PATH",
                get("LIFEGUARD_ZFS_PATH").unwrap_or(defaults.zfs),
            )?,
        };

        let sudo_path = match get("LIFEGUARD_SUDO_PATH") {
            Some(v) if v == "none" => None,
            Some(v) => Some(path_string("LIFEGUARD_SUDO_PATH", v)?),
            None => Some("/usr/bin/sudo".to_owned()),
        };

        let defaults = PropertyLists::default();
        let properties = PropertyLists {
            pool: get("LIFEGUARD_PROPERTIES_POOL").unwrap_or(defaults.pool),
            dataset: get("LIFEGUARD_PROPERTIES_DATASET").unwrap_or(defaults.dataset),
            snapshot: get("LIFEGUARD_PROPERTIES_SNAPSHOT").unwrap_or(defaults.snapshot),
        };

        let poll_interval_secs = number::<u64>("LIFEGUARD_POLL_INTERVAL", get("LIFEGUARD_POLL_INTERVAL"))?
            .unwrap_or(15);

        let notification_limit =
            number::<usize>("LIFEGUARD_NOTIFICATION_LIMIT", get("LIFEGUARD_NOTIFICATION_LIMIT"))?
                .filter(|&n| n > 0);

        let syslog_path = PathBuf::from(
            get("LIFEGUARD_SYSLOG_PATH").unwrap_or_else(|| "/dev/log".to_owned()),
        );

        Ok(Self {
            bind_addr,
            log_level,
            api_token,
            session_key,
            timeout_path,
            exec_timeout,
            tools,
            sudo_path,
            properties,
            poll_interval_secs,
            notification_limit,
            syslog: flag("LIFEGUARD_SYSLOG", true),
            syslog_path,
            debug_parse: flag("LIFEGUARD_DEBUG_PARSE", false) || get("LIFEGUARD_DEBUG").as_deref() == Some("1"),
            debug_exec: flag("LIFEGUARD_DEBUG_EXEC", false),
        })
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("api_token", &"[REDACTED]")
            .field("session_key", &self.session_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_path", &self.timeout_path)
            .field("exec_timeout", &self.exec_timeout)
            .field("tools", &self.tools)
            .field("sudo_path", &self.sudo_path)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("notification_limit", &self.notification_limit)
            .field("syslog", &self.syslog)
            .finish_non_exhaustive()
    }
}

fn absolute(var: &'static str, value: String) -> Result<PathBuf, ConfigError> {
    if Path::new(&value).is_absolute() {
        Ok(PathBuf::from(value))
    } else {
        Err(ConfigError::RelativePath { var, value })
    }
}

fn path_string(var: &'static str, value: String) -> Result<String, ConfigError> {
    absolute(var, value).map(|p| p.display().to_string())
}

fn number<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: format!("'{v}': {e}"),
            })
        })
        .transpose()
}

/// Accepts what `timeout(1)` accepts: a number with an optional unit.
fn is_duration(value: &str) -> bool {
    let digits = value.trim_end_matches(['s', 'm', 'h', 'd']);
    value.len() - digits.len() <= 1
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}
