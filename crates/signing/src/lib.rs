//! Core domain for document signing through an external signing tool.
//!
//! This crate contains every domain concept, newtype identifier, value type,
//! and error type used to drive `cryptcp`, together with the pure decision
//! logic: argument assembly, TSP endpoint selection, and classification of a
//! tool run into success, retryable failure, or fatal failure.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no process or
//! filesystem I/O. It defines *what* is needed ([`ProcessRunner`],
//! [`WorkspaceProvider`], [`Logger`], [`RandomSource`]); infrastructure crates
//! define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtypes (`Thumbprint`, `StoreName`, `TspUrl`, `Pin`, …) |
//! | [`types`] | Request, per-attempt observations, verdicts, artifact |
//! | [`errors`] | `SigningError`, categories, retry policy |
//! | [`logging`] | Four-level structured `Logger` capability |
//! | [`tsp`] | TSP endpoint pool and random selection |
//! | [`command`] | `cryptcp` argument builder |
//! | [`classifier`] | Exit status / output / file-presence classification |
//! | [`config`] | Serialisable configuration and validated settings |
//! | [`ports`] | Process runner and workspace traits |

pub mod classifier;
pub mod command;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod logging;
pub mod ports;
pub mod tsp;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use classifier::{classify, ERROR_MARKER, RETRYABLE_MARKER};
pub use command::{output_file_name, CommandBuilder, ToolArgs, INPUT_FILE_NAME};
pub use config::{SignerConfig, SignerSettings};
pub use errors::{ErrorCategory, RetryPolicy, SigningError};
pub use identifiers::{Pin, SigningRequestId, StoreName, Thumbprint, TspUrl};
pub use logging::{render_fields, Field, FieldValue, Logger, TracingLogger};
pub use ports::{Invocation, ProcessRunner, Workspace, WorkspaceProvider};
pub use tsp::{RandomSource, SeededRandom, ThreadRandom, TspPool, DEFAULT_TSP_SERVERS};
pub use types::{
    AttachMode, AttemptDiagnostic, AttemptOutcome, ChainValidation, ExecutionResult, ExitError,
    FailureReason, Payload, ProcessOutput, SignatureArtifact, SignatureProfile, SigningRequest,
    Timestamp,
};
