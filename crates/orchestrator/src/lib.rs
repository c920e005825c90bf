//! Signing orchestration.
//!
//! Sequences the pure decisions of the [`signing`] crate (command building,
//! endpoint selection, classification) with the infrastructure ports
//! (process runner, workspaces) to produce one signature per request.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** [`DocumentSigner`] owns the control flow and the
//! retry state machine in [`retry`]; it contains no knowledge of how
//! processes are spawned or where workspaces live.

pub mod retry;
pub mod signer;

#[cfg(test)]
mod test_support;

pub use retry::{Decision, RetryController, RetryState, BACKOFF_UNIT, MAX_ATTEMPTS};
pub use signer::DocumentSigner;
