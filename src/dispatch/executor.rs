//! External program execution with stdout capture.

use std::fmt;
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// A fully expanded program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Trigger of the command that produced this call, for diagnostics.
    pub command: String,
    pub executable: String,
    pub args: Vec<String>,
}

/// Why a command's program did not produce output.
#[derive(Debug)]
pub enum ExecutionError {
    /// The program could not be started.
    Spawn { command: String, source: std::io::Error },
    /// Waiting on the child or reading its stdout failed.
    Wait { command: String, source: std::io::Error },
    /// The program exited unsuccessfully.
    Failed { command: String, status: ExitStatus },
    /// The program outlived the execution timeout and was killed.
    TimedOut { command: String, after: Duration },
}

impl ExecutionError {
    /// Trigger of the command that failed.
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Wait { command, .. }
            | Self::Failed { command, .. }
            | Self::TimedOut { command, .. } => command,
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { command, source } => {
                write!(f, "error while running command({}): spawn failed: {}", command, source)
            }
            Self::Wait { command, source } => {
                write!(f, "error while running command({}): {}", command, source)
            }
            Self::Failed { command, status } => {
                write!(f, "error while running command({}): {}", command, status)
            }
            Self::TimedOut { command, after } => {
                write!(f, "error while running command({}): killed after {:?}", command, after)
            }
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } | Self::Wait { source, .. } => Some(source),
            Self::Failed { .. } | Self::TimedOut { .. } => None,
        }
    }
}

/// Runs an [`Invocation`] and returns its captured stdout.
pub trait Runner {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<String, ExecutionError>> + Send;
}

/// Spawns real child processes.
///
/// The child inherits this process's environment, stdin is closed and stderr
/// is discarded. The returned future completes when the child exits.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill children that run longer than `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Runner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String, ExecutionError> {
        let mut cmd = Command::new(&invocation.executable);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
            command: invocation.command.clone(),
            source: e,
        })?;
        debug!("Spawned {} for {} (pid {:?})", invocation.executable, invocation.command, child.id());

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                // Dropping the wait future kills the child.
                Err(_) => {
                    return Err(ExecutionError::TimedOut {
                        command: invocation.command.clone(),
                        after: limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| ExecutionError::Wait {
            command: invocation.command.clone(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                command: invocation.command.clone(),
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
