//! Logging capability consumed by the signing core.
//!
//! The core never talks to a logging backend directly. It logs through
//! [`Logger`]: four severities, each taking a message and an ordered list of
//! key/value [`Field`]s. [`TracingLogger`] is the default implementation;
//! adapters for other backends live in the `logging` crate and are chosen by
//! the caller when the signer is constructed.
//!
//! Credentials cannot be logged: [`crate::Pin`] has no conversion into
//! [`FieldValue`].

use std::fmt::Write as _;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// A loggable value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point (durations are logged as seconds).
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Ordered list of strings (argument lists, directory listings).
    List(Vec<String>),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                write!(f, "{s:?}")
            }
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.3}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::List(items) => write!(f, "{items:?}"),
        }
    }
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v as $cast)
                }
            }
        )*
    };
}

field_value_from! {
    i32 => Int as i64,
    i64 => Int as i64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f64 => Float as f64,
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        Self::Float(v.as_secs_f64())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// One key/value pair attached to a log message.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub key: &'static str,
    /// Field value.
    pub value: FieldValue,
}

impl Field {
    /// Creates a field.
    pub fn new(key: &'static str, value: impl Into<FieldValue>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// Renders fields as `key=value` pairs separated by spaces, in order.
pub fn render_fields(fields: &[Field]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}={}", field.key, field.value);
    }
    out
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Four-level structured logging capability.
pub trait Logger: Send + Sync {
    /// Verbose diagnostics (argument lists, raw tool output).
    fn debug(&self, message: &str, fields: &[Field]);
    /// Normal progress.
    fn info(&self, message: &str, fields: &[Field]);
    /// Recoverable problems (a retried attempt).
    fn warn(&self, message: &str, fields: &[Field]);
    /// Failures surfaced to the caller.
    fn error(&self, message: &str, fields: &[Field]);
}

/// Default [`Logger`] that emits `tracing` events under the
/// `signing` target.
///
/// Dynamic keys are not expressible as `tracing` fields, so they are carried
/// in a single rendered `fields` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, fields: &[Field]) {
        tracing::debug!(target: "signing", fields = %render_fields(fields), "{message}");
    }

    fn info(&self, message: &str, fields: &[Field]) {
        tracing::info!(target: "signing", fields = %render_fields(fields), "{message}");
    }

    fn warn(&self, message: &str, fields: &[Field]) {
        tracing::warn!(target: "signing", fields = %render_fields(fields), "{message}");
    }

    fn error(&self, message: &str, fields: &[Field]) {
        tracing::error!(target: "signing", fields = %render_fields(fields), "{message}");
    }
}
