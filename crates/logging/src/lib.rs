//! [`Logger`] adapters for hosts that log through the `log` facade.
//!
//! The signing core only knows its own four-level [`Logger`] capability.
//! [`LogFacadeLogger`] forwards every call to `log::log!`, appending the
//! rendered fields to the message, so the signer can be embedded in programs
//! that install a `log` backend instead of a `tracing` subscriber.

use log::Level;
use signing::{render_fields, Field, Logger};

/// Default `log` target.
pub const DEFAULT_TARGET: &str = "signing";

/// Forwards [`Logger`] calls to the `log` crate.
#[derive(Debug, Clone)]
pub struct LogFacadeLogger {
    target: String,
}

impl LogFacadeLogger {
    /// Creates an adapter logging under [`DEFAULT_TARGET`].
    pub fn new() -> Self {
        Self::with_target(DEFAULT_TARGET)
    }

    /// Creates an adapter logging under `target`.
    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Target used for every record.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn emit(&self, level: Level, message: &str, fields: &[Field]) {
        let target = self.target.as_str();
        if !log::log_enabled!(target: target, level) {
            return;
        }
        if fields.is_empty() {
            log::log!(target: target, level, "{message}");
        } else {
            log::log!(target: target, level, "{message} {}", render_fields(fields));
        }
    }
}

impl Default for LogFacadeLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for LogFacadeLogger {
    fn debug(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Error, message, fields);
    }
}
