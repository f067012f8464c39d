//! Command runner adapter on `tokio::process`.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ports::{CommandRunner, ShellCommand};

/// Runs OS commands as child processes of the current runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, command: &ShellCommand, timeout: Duration) -> Result<String> {
        debug!(command = %command.program, "Running command");

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::CommandFailed(format!(
                    "Failed to run {}: {}",
                    command.program, e
                )))
            }
            Err(_) => return Err(Error::CommandTimedOut(timeout.as_millis() as u64)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed(format!(
                "{} exited with {}: {}",
                command.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = TokioCommandRunner::new();
        let output = runner
            .run(&ShellCommand::new("echo").arg("hello"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let runner = TokioCommandRunner::new();
        let result = runner
            .run(&ShellCommand::new("false"), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(Error::CommandFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let runner = TokioCommandRunner::new();
        let result = runner
            .run(
                &ShellCommand::new("/nonexistent/definitely-not-here"),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(Error::CommandFailed(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = TokioCommandRunner::new();
        let result = runner
            .run(
                &ShellCommand::new("sleep").arg("5"),
                Duration::from_millis(50),
            )
            .await;
        assert!(matches!(result, Err(Error::CommandTimedOut(50))));
    }
}
