//! Port traits implemented by infrastructure crates.
//!
//! The orchestrator only sees these traits. The `cryptcp` crate provides the
//! production implementations (tokio processes, `tempfile` directories);
//! tests substitute fakes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ProcessOutput;

// ---------------------------------------------------------------------------
// Process execution
// ---------------------------------------------------------------------------

/// One external process run.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Executable to run.
    pub program: &'a Path,
    /// Arguments. May contain credentials; implementations must not log them.
    pub args: &'a [String],
    /// Working directory; relative file names in `args` resolve here.
    pub workdir: &'a Path,
    /// Time budget. On expiry the process is killed and the run reported as
    /// [`crate::ExitError::TimedOut`].
    pub timeout: Duration,
    /// Caller cancellation. When triggered the process is killed and the run
    /// reported as [`crate::ExitError::Cancelled`].
    pub cancel: &'a CancellationToken,
}

/// Runs external processes with captured output.
///
/// Implementations never fail: spawn errors, non-zero exits, timeouts and
/// cancellation are all reported in [`ProcessOutput::exit_error`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs the process to completion, timeout, or cancellation.
    async fn run(&self, invocation: Invocation<'_>) -> ProcessOutput;
}

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

/// Creates per-request working directories.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Creates a new, exclusively owned directory and writes `input` into it
    /// as [`crate::command::INPUT_FILE_NAME`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::SigningError::Workspace`] if the directory or the
    /// input file cannot be created.
    async fn acquire(&self, input: &[u8]) -> Result<Box<dyn Workspace>, crate::SigningError>;
}

/// A per-request working directory.
///
/// Dropping a workspace without calling [`Workspace::release`] must still
/// remove the directory (best effort), so that cancellation, which drops the
/// signing future, cannot leak it.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Directory path.
    fn path(&self) -> &Path;

    /// Absolute path of `name` inside the workspace.
    fn file_path(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Returns `true` if `name` exists inside the workspace.
    async fn exists(&self, name: &str) -> bool;

    /// Reads `name` from the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SigningError::Workspace`] if the file cannot be read.
    async fn read(&self, name: &str) -> Result<Vec<u8>, crate::SigningError>;

    /// Lists the file names present in the workspace, sorted.
    async fn list(&self) -> Vec<String>;

    /// Removes the directory and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SigningError::Workspace`] if removal fails.
    async fn release(self: Box<Self>) -> Result<(), crate::SigningError>;
}
