//! Shared value types for the signing domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! the request, the per-attempt observations of the external tool, and the
//! verdicts derived from them.

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Pin, SigningError, SigningRequestId, Thumbprint, TspUrl};

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

/// Whether the signature embeds the signed content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachMode {
    /// The signature container includes the payload (`.sig` output).
    Attached,
    /// The signature is produced separately from the payload (`.sgn` output).
    #[default]
    Detached,
}

impl AttachMode {
    /// Maps the optional boolean used by the base64 entry point.
    ///
    /// `None` and `Some(false)` both mean detached.
    pub fn from_attach_flag(attach: Option<bool>) -> Self {
        if attach == Some(true) {
            Self::Attached
        } else {
            Self::Detached
        }
    }

    /// `cryptcp` flag selecting this mode.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Attached => "-attached",
            Self::Detached => "-detached",
        }
    }

    /// Extension `cryptcp` appends to the input file name for the output.
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Attached => ".sig",
            Self::Detached => ".sgn",
        }
    }
}

impl std::fmt::Display for AttachMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attached => f.write_str("attached"),
            Self::Detached => f.write_str("detached"),
        }
    }
}

// ---------------------------------------------------------------------------

/// CAdES signature profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureProfile {
    /// CAdES-BES: signer identity and signing time only.
    Basic,
    /// CAdES-T: additionally carries a timestamp from a TSP endpoint.
    #[default]
    Timestamped,
}

impl SignatureProfile {
    /// Returns `true` if a TSP endpoint is required.
    pub fn requires_timestamp(self) -> bool {
        matches!(self, Self::Timestamped)
    }
}

impl std::str::FromStr for SignatureProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" | "cades-bes" | "bes" | "0" => Ok(Self::Basic),
            "timestamped" | "cades-t" | "t" | "1" => Ok(Self::Timestamped),
            other => Err(format!("unknown signature profile '{other}'")),
        }
    }
}

impl std::fmt::Display for SignatureProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => f.write_str("cades-bes"),
            Self::Timestamped => f.write_str("cades-t"),
        }
    }
}

// ---------------------------------------------------------------------------

/// Whether the signing tool validates the certificate chain and revocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainValidation {
    /// Chain and revocation status are checked by the tool.
    #[default]
    Enabled,
    /// `-nochain -norev` are passed to the tool.
    Disabled,
}

impl ChainValidation {
    /// Builds the policy from the `skip_chain_validation` configuration flag.
    pub fn from_skip_flag(skip: bool) -> Self {
        if skip {
            Self::Disabled
        } else {
            Self::Enabled
        }
    }
}

// ---------------------------------------------------------------------------

/// Raw bytes to be signed.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wraps raw payload bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decodes a standard-alphabet base64 payload.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidInput`] if `encoded` is not valid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, SigningError> {
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(|e| SigningError::InvalidInput {
                message: format!("base64 decode: {e}"),
            })
    }

    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

// ---------------------------------------------------------------------------

/// One signing request. Immutable for the duration of the operation.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    /// Correlation identifier for logs and spans.
    pub id: SigningRequestId,
    /// Signer certificate.
    pub thumbprint: Thumbprint,
    /// Key container PIN.
    pub pin: Pin,
    /// Bytes to sign.
    pub payload: Payload,
    /// Attached or detached output.
    pub attach_mode: AttachMode,
    /// Profile override; `None` uses the signer's configured default.
    pub profile: Option<SignatureProfile>,
}

impl SigningRequest {
    /// Creates a detached request using the configured default profile.
    pub fn new(thumbprint: Thumbprint, pin: Pin, payload: Payload) -> Self {
        Self {
            id: SigningRequestId::new_random(),
            thumbprint,
            pin,
            payload,
            attach_mode: AttachMode::default(),
            profile: None,
        }
    }

    /// Sets the attachment mode.
    #[must_use]
    pub fn with_attach_mode(mut self, mode: AttachMode) -> Self {
        self.attach_mode = mode;
        self
    }

    /// Overrides the signature profile.
    #[must_use]
    pub fn with_profile(mut self, profile: SignatureProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

// ---------------------------------------------------------------------------
// Process observations
// ---------------------------------------------------------------------------

/// Why the external process did not finish cleanly.
///
/// This is data for the classifier, not a failure of the process runner: a
/// runner reports every outcome through [`ProcessOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitError {
    /// The process exited with a non-zero status, or was killed by a signal
    /// (`code` is `None`).
    Exited {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },
    /// The process exceeded its time budget and was killed.
    TimedOut {
        /// Budget that was exceeded.
        after: Duration,
    },
    /// The caller cancelled the request while the process was running.
    Cancelled,
    /// The process could not be started at all.
    Spawn {
        /// OS error text.
        message: String,
    },
    /// The process started but its output could not be collected.
    Wait {
        /// OS error text.
        message: String,
    },
}

impl std::fmt::Display for ExitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited { code: Some(code) } => write!(f, "exit status {code}"),
            Self::Exited { code: None } => f.write_str("terminated by signal"),
            Self::TimedOut { after } => {
                write!(f, "deadline exceeded after {:.2}s", after.as_secs_f64())
            }
            Self::Cancelled => f.write_str("cancelled"),
            Self::Spawn { message } => write!(f, "failed to start: {message}"),
            Self::Wait { message } => write!(f, "failed to collect output: {message}"),
        }
    }
}

/// Everything a process runner observed about one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process exited with status zero.
    pub exit_error: Option<ExitError>,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Wall-clock time between spawn and exit.
    pub duration: Duration,
}

/// Observations from a single attempt: the process output plus the
/// filesystem side effect the classifier relies on.
///
/// Built fresh for every attempt and discarded after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// 1-based attempt number.
    pub attempt: u32,
    /// What the process runner reported.
    pub output: ProcessOutput,
    /// Whether the expected signature file exists after the run.
    pub output_exists: bool,
    /// Names of the files present in the workspace. Only collected when the
    /// expected output is missing, for diagnostics.
    pub workspace_files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Which success condition an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The expected signature file was not written.
    MissingOutput,
    /// The tool printed an error marker despite producing a file.
    ErrorInOutput,
    /// The process itself failed (non-zero exit, spawn failure).
    ToolFailed,
}

/// Diagnostic detail attached to a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDiagnostic {
    /// Failed condition.
    pub reason: FailureReason,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Process exit error, if any.
    pub exit_error: Option<ExitError>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Duration of the attempt.
    pub duration: Duration,
    /// Path the signature was expected at.
    pub expected_output: PathBuf,
    /// Files found in the workspace when the output was missing.
    pub workspace_files: Vec<String>,
}

impl std::fmt::Display for AttemptDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.duration.as_secs_f64();
        match self.reason {
            FailureReason::MissingOutput => write!(
                f,
                "signature file not created after {secs:.2}s (expected: {}, files: {:?})",
                self.expected_output.display(),
                self.workspace_files
            )?,
            FailureReason::ErrorInOutput => {
                write!(f, "signing tool reported error in output after {secs:.2}s")?
            }
            FailureReason::ToolFailed => {
                write!(f, "signing tool failed after {secs:.2}s")?;
                if let Some(exit) = &self.exit_error {
                    write!(f, ": {exit}")?;
                }
            }
        }
        write!(f, ", stdout: {}, stderr: {}", self.stdout, self.stderr)
    }
}

/// Verdict for one attempt; drives the retry controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// All success conditions held.
    Success,
    /// Failed with the transient TSP marker; another attempt may succeed.
    RetryableFailure(AttemptDiagnostic),
    /// Failed for any other reason; retrying cannot help.
    FatalFailure(AttemptDiagnostic),
}

impl AttemptOutcome {
    /// Returns the failure diagnostic, if any.
    pub fn diagnostic(&self) -> Option<&AttemptDiagnostic> {
        match self {
            Self::Success => None,
            Self::RetryableFailure(d) | Self::FatalFailure(d) => Some(d),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// A signature produced by the external tool (DER bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureArtifact {
    /// Signature container as written by the tool.
    pub der: Vec<u8>,
    /// Attempt that produced it (1-based).
    pub attempts: u32,
    /// TSP endpoint used by the successful attempt, if timestamped.
    pub tsp_url: Option<TspUrl>,
    /// When the artifact was collected.
    pub signed_at: Timestamp,
}

impl SignatureArtifact {
    /// Standard-alphabet base64 encoding of the signature.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }
}
