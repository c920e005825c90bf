//! Signature-class error type and retry-policy semantics.
//!
//! [`SigningError`] is the only error a signing operation returns. Callers
//! discriminate on [`SigningError::category`] (or [`SigningError::retry_policy`]),
//! never on message text; the message carries the tool's stdout, stderr,
//! duration and workspace details for operators only.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AttemptDiagnostic;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry at the caller's level.
///
/// Only [`ErrorCategory::TransientTool`] is retryable: the timestamp authority
/// may be reachable again later. Everything else needs a configuration,
/// input, or environment change first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried without intervention.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Stable category marker for programmatic error discrimination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request (e.g. payload encoding).
    Input,
    /// Workspace or file creation, read, or teardown failure.
    Resource,
    /// Invalid signer configuration.
    Configuration,
    /// The tool kept reporting a transient TSP failure until attempts ran out.
    TransientTool,
    /// The tool failed in a way retrying cannot fix.
    PermanentTool,
    /// The end-to-end deadline elapsed.
    DeadlineExceeded,
    /// The caller cancelled the request.
    Cancelled,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Resource => "resource",
            Self::Configuration => "configuration",
            Self::TransientTool => "transient_tool",
            Self::PermanentTool => "permanent_tool",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by a signing operation.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The request could not be interpreted; no process was started.
    #[error("signature failed: invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// A workspace filesystem operation failed.
    #[error("signature failed: {operation}{}: {source}", fmt_path(.path))]
    Workspace {
        /// What was being done (e.g. `"create work directory"`).
        operation: &'static str,
        /// Path involved, when known.
        path: Option<PathBuf>,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The signer configuration cannot satisfy the request.
    #[error("signature failed: configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Every attempt failed with a transient TSP error.
    #[error("signature failed after {attempts} attempts: {diagnostic}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Diagnostic of the last attempt.
        diagnostic: Box<AttemptDiagnostic>,
    },

    /// An attempt failed permanently; no retry was made.
    #[error("signature failed: {diagnostic}")]
    ToolFailure {
        /// Diagnostic of the failing attempt.
        diagnostic: Box<AttemptDiagnostic>,
    },

    /// The end-to-end deadline elapsed before a signature was produced.
    #[error(
        "signature failed: deadline of {:.2}s exceeded after {attempts} attempt(s)",
        .budget.as_secs_f64()
    )]
    DeadlineExceeded {
        /// The overall time budget.
        budget: Duration,
        /// Attempts started before the deadline hit.
        attempts: u32,
    },

    /// The caller cancelled the request.
    #[error("signature failed: cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" {}", p.display()),
        None => String::new(),
    }
}

impl SigningError {
    /// Builds a [`SigningError::Workspace`] for `operation` on `path`.
    pub fn workspace(
        operation: &'static str,
        path: Option<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Workspace {
            operation,
            path,
            source,
        }
    }

    /// Stable category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. } => ErrorCategory::Input,
            Self::Workspace { .. } => ErrorCategory::Resource,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::RetriesExhausted { .. } => ErrorCategory::TransientTool,
            Self::ToolFailure { .. } => ErrorCategory::PermanentTool,
            Self::DeadlineExceeded { .. } => ErrorCategory::DeadlineExceeded,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Whether the caller may resubmit the same request unchanged.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.category() {
            ErrorCategory::TransientTool => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }

    /// Diagnostic of the failing attempt for tool-class errors.
    pub fn diagnostic(&self) -> Option<&AttemptDiagnostic> {
        match self {
            Self::RetriesExhausted { diagnostic, .. } | Self::ToolFailure { diagnostic } => {
                Some(diagnostic)
            }
            _ => None,
        }
    }
}
