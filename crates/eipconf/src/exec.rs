//! External command execution with bounded retry.
//!
//! All actuation goes through a [`CommandRunner`], which runs one process
//! and reports what it printed. [`Executor`] wraps a runner with a
//! [`RetryPolicy`]: mutating commands are retried a fixed number of times
//! with a fixed delay, and output mentioning an already existing interface
//! counts as success.
//!
//! ```ignore
//! use eipconf::exec::{Executor, RetryPolicy, SystemRunner};
//!
//! let exec = Executor::new(SystemRunner, RetryPolicy::default());
//! exec.run("ifconfig", &["gif1".into(), "create".into()]).await?;
//! ```

use std::future::Future;
use std::io;
use std::time::Duration;

use crate::error::{Error, Result};

/// Captured result of one process invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful invocation that printed `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed invocation that printed `stderr`.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout and stderr joined, as a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }
}

/// Runs a single external process.
///
/// Implementations must not retry; retry is the [`Executor`]'s concern.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion and capture its output.
    fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

/// Runs real processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Bounded retry policy for mutating commands.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Output substring that makes a non-zero exit count as success.
    pub success_marker: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            success_marker: Some("already exists".to_string()),
        }
    }
}

impl RetryPolicy {
    /// Create a policy without a success marker.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            success_marker: None,
        }
    }

    /// Treat output containing `marker` as success regardless of exit status.
    pub fn success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = Some(marker.into());
        self
    }

    /// Check whether an invocation counts as success under this policy.
    pub fn is_success(&self, output: &CommandOutput) -> bool {
        output.success
            || self
                .success_marker
                .as_deref()
                .is_some_and(|marker| output.combined().contains(marker))
    }
}

/// Command executor: a [`CommandRunner`] plus a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Executor<R> {
    runner: R,
    policy: RetryPolicy,
}

impl<R: CommandRunner> Executor<R> {
    /// Create an executor.
    pub fn new(runner: R, policy: RetryPolicy) -> Self {
        Self { runner, policy }
    }

    /// Get the underlying runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Get the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a mutating command under the retry policy.
    ///
    /// Spawn failures are retried like non-zero exits.
    pub async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let command = command_line(program, args);
        let mut last_output = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match self.runner.run(program, args).await {
                Ok(output) if self.policy.is_success(&output) => {
                    if output.success {
                        tracing::debug!(command = %command, "command succeeded");
                    } else {
                        tracing::info!(command = %command, "interface already exists, skipping creation");
                    }
                    return Ok(output);
                }
                Ok(output) => {
                    last_output = output.combined().trim().to_string();
                    tracing::error!(command = %command, attempt, error = %last_output, "command failed");
                }
                Err(e) => {
                    last_output = e.to_string();
                    tracing::error!(command = %command, attempt, error = %e, "command could not be started");
                }
            }

            if attempt < self.policy.max_attempts {
                tracing::debug!(delay = ?self.policy.delay, "retrying command");
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        Err(Error::CommandFailed {
            command,
            attempts: self.policy.max_attempts,
            output: last_output,
        })
    }

    /// Run a read-only query once; a non-zero exit is an error.
    pub async fn query(&self, program: &str, args: &[String]) -> Result<String> {
        let output = self.runner.run(program, args).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(Error::QueryFailed {
                command: command_line(program, args),
                output: output.combined().trim().to_string(),
            })
        }
    }
}

/// Render a command line for logs and errors.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
