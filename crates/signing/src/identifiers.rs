//! Newtype domain identifiers.
//!
//! Every value that names something (a certificate, a store, a timestamp
//! authority) is a distinct newtype wrapping a primitive. This prevents
//! accidentally passing, for example, a [`Thumbprint`] where a [`StoreName`]
//! is expected even though both are strings under the hood.
//!
//! [`Pin`] is not generated by the macro: it has no `Display`,
//! its `Debug` output is redacted, and it cannot be turned into a log field.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// SHA-1 thumbprint of the signer certificate, as printed by `certmgr -list`.
    ///
    /// Matching against store listings is case-insensitive.
    Thumbprint
}

string_id! {
    /// Name of a certificate store (e.g. `"uMy"`, `"MY"`, `"CA"`).
    StoreName
}

string_id! {
    /// URL of an RFC 3161 timestamp authority (TSP) endpoint.
    TspUrl
}

impl StoreName {
    /// Formats the store as the `cryptcp` store selector option.
    ///
    /// Names already carrying a location prefix (`u…` for the user store,
    /// `m…` for the machine store, matched case-insensitively) are passed
    /// through with a leading dash. Anything else is placed in the user store
    /// and capitalised: `"ca"` → `"-uCa"`.
    pub fn to_cli_option(&self) -> String {
        let lower = self.0.to_lowercase();
        if lower.starts_with('u') || lower.starts_with('m') {
            return format!("-{}", self.0);
        }

        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => format!(
                "-u{}{}",
                first.to_uppercase(),
                chars.as_str().to_lowercase()
            ),
            None => "-u".to_string(),
        }
    }
}

impl TspUrl {
    /// Returns `true` if the URL uses the `http` or `https` scheme.
    pub fn has_http_scheme(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// PIN protecting the signer's private key container.
///
/// Only the command builder reads the raw value (via [`Pin::expose`]). The
/// type implements neither `Display` nor `Serialize`, and its
/// `Debug` output never contains the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    /// Wraps a PIN value. Empty PINs are allowed; some containers have none.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw secret. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pin(***)")
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single signing request.
///
/// Generated fresh for every request; propagated through spans and log fields
/// so all activity from one request (every attempt included) can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningRequestId(Uuid);

impl SigningRequestId {
    /// Generates a new random request identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SigningRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
