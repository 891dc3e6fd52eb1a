//! The only code path allowed to start external programs.
//!
//! Every command is executed in argument-vector form (never through a
//! shell) and prefixed with an external timeout utility so that a hung
//! storage layer cannot hold a request forever. Children are spawned with
//! `kill_on_drop`, so a request future that is dropped midway still reaps
//! its process.
//!
//! The [`CommandRunner`] trait is the seam the rest of the crate depends on;
//! [`Executor`] is the real implementation and `testing::ScriptedRunner`
//! (feature `testing`) replays canned output in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecError;

/// Locale and search path every child runs with, so tool output stays in
/// the untranslated format the parser understands.
const CHILD_LOCALE: &str = "C";
const CHILD_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs argument vectors on behalf of the rest of the crate.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv` with an optional standard-input payload.
    ///
    /// # Errors
    ///
    /// - [`ExecError::Spawn`] if the program could not be started.
    /// - [`ExecError::Failed`] if it exited unsuccessfully; the captured
    ///   standard error is carried on the error.
    async fn run(&self, argv: &[String], stdin: Option<&[u8]>) -> Result<ExecOutput, ExecError>;
}

/// Configuration for the real [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Absolute path of the `timeout` utility.
    pub timeout_path: PathBuf,
    /// Duration argument passed to the timeout utility (e.g. `10s`).
    pub timeout: String,
    /// Log every argument vector at `debug` level.
    pub log_commands: bool,
}

/// Executes commands through the configured timeout utility.
#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecConfig,
}

impl Executor {
    /// Create an executor, verifying that the timeout utility exists.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::TimeoutUtility`] if the path is relative, missing
    /// or not a regular file. Callers treat this as fatal.
    pub fn new(config: ExecConfig) -> Result<Self, ExecError> {
        check_timeout_utility(&config.timeout_path)?;
        Ok(Self { config })
    }

    /// Full argument vector actually executed for `argv`.
    fn wrapped(&self, argv: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(argv.len().saturating_add(2));
        full.push(self.config.timeout_path.to_string_lossy().into_owned());
        full.push(self.config.timeout.clone());
        full.extend(argv.iter().cloned());
        full
    }
}

fn check_timeout_utility(path: &Path) -> Result<(), ExecError> {
    let fail = |reason: String| ExecError::TimeoutUtility {
        path: path.display().to_string(),
        reason,
    };

    if !path.is_absolute() {
        return Err(fail("path must be absolute".to_owned()));
    }

    let meta = std::fs::metadata(path).map_err(|e| fail(e.to_string()))?;
    if !meta.is_file() {
        return Err(fail("not a regular file".to_owned()));
    }
    Ok(())
}

#[async_trait::async_trait]
impl CommandRunner for Executor {
    async fn run(&self, argv: &[String], stdin: Option<&[u8]>) -> Result<ExecOutput, ExecError> {
        if argv.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        let full = self.wrapped(argv);
        let command_line = full.join(" ");
        if self.config.log_commands {
            debug!(command = %command_line, with_stdin = stdin.is_some(), "executing command");
        }

        let mut cmd = Command::new(&full[0]);
        cmd.args(&full[1..])
            .env_clear()
            .env("LC_ALL", CHILD_LOCALE)
            .env("PATH", CHILD_PATH)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        if let Some(payload) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                match pipe.write_all(payload).await {
                    // A child that exits without reading stdin still has
                    // output worth collecting.
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(source) => {
                        return Err(ExecError::Stdin {
                            command: command_line,
                            source,
                        });
                    }
                }
                // Dropping the pipe closes it so the child sees EOF.
                drop(pipe);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ExecError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ExecError::Failed {
                command: command_line,
                code: output.status.code(),
                stderr,
            });
        }

        Ok(ExecOutput { stdout, stderr })
    }
}

/// Fakes for exercising code that runs commands.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{CommandRunner, ExecOutput};
    use crate::error::ExecError;

    /// One recorded invocation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        pub argv: Vec<String>,
        pub stdin: Option<Vec<u8>>,
    }

    #[derive(Debug, Clone)]
    enum Reply {
        Success(String),
        Failure { code: i32, stderr: String },
    }

    /// A [`CommandRunner`] that answers exact argument vectors with canned
    /// output. Unknown commands fail with exit status 127.
    #[derive(Debug, Default)]
    pub struct ScriptedRunner {
        replies: Mutex<HashMap<Vec<String>, Reply>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer `argv` with a successful exit and `stdout`.
        pub fn on_success(&self, argv: &[&str], stdout: &str) {
            self.insert(argv, Reply::Success(stdout.to_owned()));
        }

        /// Answer `argv` with exit status 1 and `stderr`.
        pub fn on_failure(&self, argv: &[&str], stderr: &str) {
            self.insert(
                argv,
                Reply::Failure {
                    code: 1,
                    stderr: stderr.to_owned(),
                },
            );
        }

        /// Every invocation seen so far, in order.
        pub fn calls(&self) -> Vec<Invocation> {
            self.calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        fn insert(&self, argv: &[&str], reply: Reply) {
            let key = argv.iter().map(|s| (*s).to_owned()).collect();
            self.replies
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, reply);
        }
    }

    #[async_trait::async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            argv: &[String],
            stdin: Option<&[u8]>,
        ) -> Result<ExecOutput, ExecError> {
            self.calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(Invocation {
                    argv: argv.to_vec(),
                    stdin: stdin.map(<[u8]>::to_vec),
                });

            let reply = self
                .replies
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(argv)
                .cloned();

            match reply {
                Some(Reply::Success(stdout)) => Ok(ExecOutput {
                    stdout,
                    stderr: String::new(),
                }),
                Some(Reply::Failure { code, stderr }) => Err(ExecError::Failed {
                    command: argv.join(" "),
                    code: Some(code),
                    stderr,
                }),
                None => Err(ExecError::Failed {
                    command: argv.join(" "),
                    code: Some(127),
                    stderr: format!("no scripted reply for {argv:?}"),
                }),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TIMEOUT: &str = "/usr/bin/timeout";

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    /// Executor backed by the host's timeout utility, if it has one.
    fn host_executor(timeout: &str) -> Option<Executor> {
        Executor::new(ExecConfig {
            timeout_path: PathBuf::from(TIMEOUT),
            timeout: timeout.to_owned(),
            log_commands: true,
        })
        .ok()
    }

    #[test]
    fn relative_timeout_path_is_rejected() {
        let err = Executor::new(ExecConfig {
            timeout_path: PathBuf::from("timeout"),
            timeout: "5s".to_owned(),
            log_commands: false,
        })
        .unwrap_err();
        assert!(matches!(err, ExecError::TimeoutUtility { .. }));
    }

    #[test]
    fn missing_timeout_utility_is_rejected() {
        let err = Executor::new(ExecConfig {
            timeout_path: PathBuf::from("/nonexistent/lifeguard/timeout"),
            timeout: "5s".to_owned(),
            log_commands: false,
        })
        .unwrap_err();
        assert!(matches!(err, ExecError::TimeoutUtility { .. }));
    }

    #[test]
    fn wrapped_prefixes_timeout_utility() {
        let exec = Executor {
            config: ExecConfig {
                timeout_path: PathBuf::from(TIMEOUT),
                timeout: "10s".to_owned(),
                log_commands: false,
            },
        };
        assert_eq!(
            exec.wrapped(&argv(&["/sbin/zpool", "status", "tank"])),
            argv(&[TIMEOUT, "10s", "/sbin/zpool", "status", "tank"])
        );
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let Some(exec) = host_executor("5s") else { return };
        let err = exec.run(&[], None).await.unwrap_err();
        assert!(matches!(err, ExecError::EmptyCommand));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let Some(exec) = host_executor("5s") else { return };
        let out = exec
            .run(&argv(&["/bin/echo", "hello; rm -rf /"]), None)
            .await
            .unwrap();
        // The argument reached echo untouched, no shell interpreted it.
        assert_eq!(out.stdout, "hello; rm -rf /\n");
    }

    #[tokio::test]
    async fn delivers_stdin() {
        let Some(exec) = host_executor("5s") else { return };
        let out = exec
            .run(&argv(&["/bin/cat"]), Some(b"passphrase"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "passphrase");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let Some(exec) = host_executor("5s") else { return };
        let err = exec
            .run(&argv(&["/bin/sh", "-c", "echo boom >&2; exit 3"]), None)
            .await
            .unwrap_err();
        assert_eq!(err.stderr(), Some("boom\n"));
        assert!(matches!(err, ExecError::Failed { code: Some(3), .. }));
    }

    #[tokio::test]
    async fn hung_command_is_bounded_by_timeout() {
        let Some(exec) = host_executor("1s") else { return };
        let err = exec.run(&argv(&["/bin/sleep", "30"]), None).await.unwrap_err();
        // timeout(1) reports an expired command with status 124.
        assert!(matches!(err, ExecError::Failed { code: Some(124), .. }));
    }

    #[tokio::test]
    async fn scripted_runner_replays_and_records() {
        let runner = testing::ScriptedRunner::new();
        runner.on_success(&["/sbin/zpool", "version"], "zfs-2.1.5\n");
        runner.on_failure(&["/sbin/zfs", "mount", "tank"], "busy");

        let out = runner
            .run(&argv(&["/sbin/zpool", "version"]), None)
            .await
            .unwrap();
        assert_eq!(out.stdout, "zfs-2.1.5\n");

        let err = runner
            .run(&argv(&["/sbin/zfs", "mount", "tank"]), Some(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.stderr(), Some("busy"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].stdin.as_deref(), Some(b"x".as_slice()));
    }
}
