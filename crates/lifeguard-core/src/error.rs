//! Error types for `lifeguard-core`.
//!
//! Each error variant carries enough context to diagnose the problem from
//! the logs. Standard-error text from the storage tools is kept on the error
//! so callers can match known messages, but it is never meant to be shown to
//! a web client verbatim.

/// Errors from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The configured timeout utility is missing or unusable.
    #[error("timeout utility '{path}' is unusable: {reason}")]
    TimeoutUtility { path: String, reason: String },

    /// An empty argument vector was handed to the executor.
    #[error("refusing to execute an empty command")]
    EmptyCommand,

    /// The process could not be started.
    #[error("failed to start [{command}]: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The standard-input payload could not be delivered.
    #[error("failed to write stdin for [{command}]: {source}")]
    Stdin {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully (including timeouts, which
    /// the timeout utility reports as exit status 124).
    #[error("[{command}] exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ExecError {
    /// Captured standard error of a failed command, if the command ran.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Errors from the identifier vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The session key used to derive tokens is empty.
    #[error("identifier vault key must not be empty")]
    EmptyKey,
}

/// Errors from property listing.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    /// A type filter was combined with a command family that has none.
    #[error("type filters are only supported for dataset listings, not {family}")]
    FilterNotSupported { family: &'static str },

    /// The property list was empty after sanitization.
    #[error("property list is empty")]
    EmptyPropertyList,

    /// The listing command failed.
    #[error("property listing failed: {0}")]
    Command(#[from] ExecError),
}

impl PropertyError {
    /// Whether this error stems from configuration rather than the runtime
    /// state of the storage tools.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::FilterNotSupported { .. } | Self::EmptyPropertyList
        )
    }
}

/// Errors from the `zpool`/`zfs` command facade.
#[derive(Debug, thiserror::Error)]
pub enum ZfsError {
    /// The identifier was empty after sanitization.
    #[error("identifier is empty after sanitization")]
    InvalidName,

    /// `zfs load-key` rejected the passphrase.
    #[error("incorrect passphrase")]
    IncorrectKey,

    /// `zfs unload-key` failed because the dataset is in use.
    #[error("dataset is mounted")]
    DatasetBusy,

    /// `zfs mount` failed because the encryption key is not loaded.
    #[error("encryption key is not loaded")]
    KeyNotLoaded,

    /// A listing returned no row for the requested object.
    #[error("no '{property}' property returned for the requested object")]
    MissingProperty { property: String },

    /// A property listing failed.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// The underlying command failed for a reason with no known message.
    #[error("zfs command failed: {0}")]
    Command(#[from] ExecError),
}

/// Errors from notification backends.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The backend could not be reached at startup.
    #[error("cannot connect notification backend at '{path}': {reason}")]
    Connect { path: String, reason: String },

    /// Forwarding one notification failed.
    #[error("notification backend '{name}' failed: {reason}")]
    BackendFailure { name: String, reason: String },
}
