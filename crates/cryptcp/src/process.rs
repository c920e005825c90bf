//! Process runner backed by `tokio::process`.
//!
//! The child is spawned with `kill_on_drop`, so abandoning the wait (timeout,
//! cancellation, or the caller dropping the future) kills it.

use std::process::Stdio;

use async_trait::async_trait;
use signing::{ExitError, Invocation, ProcessOutput, ProcessRunner};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Runs external processes with captured stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Creates a runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: Invocation<'_>) -> ProcessOutput {
        // Arguments carry the PIN: only the program and directory are logged.
        debug!(
            program = %invocation.program.display(),
            workdir = %invocation.workdir.display(),
            timeout_secs = invocation.timeout.as_secs_f64(),
            "spawning process"
        );

        let started = Instant::now();
        let child = Command::new(invocation.program)
            .args(invocation.args)
            .current_dir(invocation.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %invocation.program.display(), error = %e, "failed to spawn process");
                return failed(
                    ExitError::Spawn {
                        message: format!("{}: {e}", invocation.program.display()),
                    },
                    started,
                );
            }
        };

        tokio::select! {
            biased;
            _ = invocation.cancel.cancelled() => {
                debug!(program = %invocation.program.display(), "process cancelled");
                failed(ExitError::Cancelled, started)
            }
            _ = tokio::time::sleep(invocation.timeout) => {
                warn!(
                    program = %invocation.program.display(),
                    timeout_secs = invocation.timeout.as_secs_f64(),
                    "process timed out"
                );
                failed(ExitError::TimedOut { after: invocation.timeout }, started)
            }
            result = child.wait_with_output() => match result {
                Ok(output) => ProcessOutput {
                    exit_error: if output.status.success() {
                        None
                    } else {
                        Some(ExitError::Exited {
                            code: output.status.code(),
                        })
                    },
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    duration: started.elapsed(),
                },
                Err(e) => failed(
                    ExitError::Wait {
                        message: e.to_string(),
                    },
                    started,
                ),
            },
        }
    }
}

fn failed(exit_error: ExitError, started: Instant) -> ProcessOutput {
    ProcessOutput {
        exit_error: Some(exit_error),
        stdout: String::new(),
        stderr: String::new(),
        duration: started.elapsed(),
    }
}
