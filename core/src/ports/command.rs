//! Command runner port (interface).

use std::time::Duration;

use crate::error::Result;

/// An OS command as a program plus arguments, built by a platform strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Port for executing OS commands.
///
/// Implementations decode stdout lossily so that shell encoding artifacts
/// reach the parsers instead of failing the call.
pub trait CommandRunner: Send + Sync {
    /// Run `command` and return its stdout, failing on spawn errors,
    /// non-zero exit status or when `timeout` elapses.
    fn run(
        &self,
        command: &ShellCommand,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}
