//! Outcome classification for one signing attempt.
//!
//! `cryptcp` reports failures inconsistently: sometimes through the exit
//! status, sometimes only as text on stdout with a zero exit status, and
//! sometimes by silently not writing the output file. An attempt therefore
//! succeeds only if all three signals agree.
//!
//! The text checks are un-anchored, case-insensitive substring matches over
//! the exit error, stdout and stderr. Legitimate output containing
//! `"error:"` is misread as a failure; this is a known limitation of the
//! heuristic, kept in this one function so it can be tightened without
//! touching retry or workspace handling.

use std::path::Path;

use crate::{AttemptDiagnostic, AttemptOutcome, ExecutionResult, FailureReason};

/// Marker that turns an otherwise clean run into a failure.
pub const ERROR_MARKER: &str = "error:";

/// Marker of a transient timestamp-authority failure.
pub const RETRYABLE_MARKER: &str = "http error";

/// Classifies one attempt.
///
/// Success requires no exit error, the output file present, and no
/// [`ERROR_MARKER`] in the combined text. Any failure whose combined text
/// contains [`RETRYABLE_MARKER`] is retryable; every other failure is fatal.
pub fn classify(result: &ExecutionResult, expected_output: &Path) -> AttemptOutcome {
    let text = combined_text(result);
    let has_error_marker = text.contains(ERROR_MARKER);

    if result.output.exit_error.is_none() && result.output_exists && !has_error_marker {
        return AttemptOutcome::Success;
    }

    let reason = if !result.output_exists {
        FailureReason::MissingOutput
    } else if has_error_marker {
        FailureReason::ErrorInOutput
    } else {
        FailureReason::ToolFailed
    };

    let diagnostic = AttemptDiagnostic {
        reason,
        attempt: result.attempt,
        exit_error: result.output.exit_error.clone(),
        stdout: result.output.stdout.clone(),
        stderr: result.output.stderr.clone(),
        duration: result.output.duration,
        expected_output: expected_output.to_path_buf(),
        workspace_files: result.workspace_files.clone(),
    };

    if text.contains(RETRYABLE_MARKER) {
        AttemptOutcome::RetryableFailure(diagnostic)
    } else {
        AttemptOutcome::FatalFailure(diagnostic)
    }
}

fn combined_text(result: &ExecutionResult) -> String {
    let exit = result
        .output
        .exit_error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!("{exit} {} {}", result.output.stdout, result.output.stderr).to_lowercase()
}
