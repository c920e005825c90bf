//! Retry controller for one signing request.
//!
//! A three-state machine: `Attempting` → `Succeeded` | `Exhausted`. Fatal
//! failures end the sequence immediately; only retryable failures (the
//! transient TSP signature) earn another attempt, after a linear backoff.

use std::time::Duration;

use signing::{AttemptDiagnostic, AttemptOutcome};

/// Maximum attempts per request.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff before attempt `n` is `(n - 1) * BACKOFF_UNIT`.
pub const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt `attempt` is (about to be) running.
    Attempting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Attempt `attempt` succeeded. Terminal.
    Succeeded {
        /// Successful attempt.
        attempt: u32,
    },
    /// No further attempts will be made. Terminal.
    Exhausted {
        /// Last attempt made.
        attempt: u32,
    },
}

/// What the caller must do after recording an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Collect the artifact.
    Succeeded {
        /// Successful attempt.
        attempt: u32,
    },
    /// Sleep for `backoff`, then run `next_attempt`.
    Retry {
        /// Attempt to run next.
        next_attempt: u32,
        /// Delay before it.
        backoff: Duration,
        /// Why the previous attempt failed.
        diagnostic: AttemptDiagnostic,
    },
    /// Every attempt failed with a retryable failure.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Diagnostic of the last attempt.
        diagnostic: AttemptDiagnostic,
    },
    /// The attempt failed permanently.
    Fatal {
        /// Diagnostic of the failing attempt.
        diagnostic: AttemptDiagnostic,
    },
}

/// Drives attempt numbering and backoff.
#[derive(Debug, Clone)]
pub struct RetryController {
    state: RetryState,
}

impl RetryController {
    /// Starts in `Attempting { attempt: 1 }`.
    pub fn new() -> Self {
        Self {
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    /// Current state.
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Current (or last) attempt number.
    pub fn attempt(&self) -> u32 {
        match self.state {
            RetryState::Attempting { attempt }
            | RetryState::Succeeded { attempt }
            | RetryState::Exhausted { attempt } => attempt,
        }
    }

    /// Delay before `attempt`.
    pub fn backoff_before(attempt: u32) -> Duration {
        BACKOFF_UNIT * attempt.saturating_sub(1)
    }

    /// Records the outcome of the current attempt and transitions.
    ///
    /// Recording into a terminal state never schedules another attempt.
    pub fn record(&mut self, outcome: AttemptOutcome) -> Decision {
        let attempt = self.attempt();
        let attempting = matches!(self.state, RetryState::Attempting { .. });

        match outcome {
            AttemptOutcome::Success => {
                self.state = RetryState::Succeeded { attempt };
                Decision::Succeeded { attempt }
            }
            AttemptOutcome::FatalFailure(diagnostic) => {
                self.state = RetryState::Exhausted { attempt };
                Decision::Fatal { diagnostic }
            }
            AttemptOutcome::RetryableFailure(diagnostic) => {
                if attempting && attempt < MAX_ATTEMPTS {
                    let next_attempt = attempt + 1;
                    self.state = RetryState::Attempting {
                        attempt: next_attempt,
                    };
                    Decision::Retry {
                        next_attempt,
                        backoff: Self::backoff_before(next_attempt),
                        diagnostic,
                    }
                } else {
                    self.state = RetryState::Exhausted { attempt };
                    Decision::Exhausted {
                        attempts: attempt,
                        diagnostic,
                    }
                }
            }
        }
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new()
    }
}
