//! Signer configuration.
//!
//! [`SignerConfig`] is the serialisable form (loaded from TOML by the CLI).
//! [`SignerConfig::validate`] turns it into [`SignerSettings`], the typed
//! values the orchestrator and the certificate manager are constructed from.
//! A signer never starts with an invalid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ChainValidation, SignatureProfile, SigningError, StoreName, TspPool, TspUrl};

/// Default location of the `cryptcp` binary.
pub const DEFAULT_CRYPTCP_PATH: &str = "/opt/cprocsp/bin/amd64/cryptcp";

/// Default location of the `certmgr` binary.
pub const DEFAULT_CERTMGR_PATH: &str = "/opt/cprocsp/bin/amd64/certmgr";

/// Default end-to-end budget for one signing request (all attempts).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Serialisable signer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignerConfig {
    /// Certificate store (e.g. `"uMy"`).
    pub store: String,
    /// TSP endpoints. `None` selects the built-in defaults; an explicit empty
    /// list disables timestamped signatures.
    pub tsp_servers: Option<Vec<String>>,
    /// Profile used when a request does not specify one.
    pub signature_profile: SignatureProfile,
    /// Pass `-nochain -norev` to the tool.
    pub skip_chain_validation: bool,
    /// Path of the `cryptcp` binary.
    pub cryptcp_path: PathBuf,
    /// Path of the `certmgr` binary.
    pub certmgr_path: PathBuf,
    /// Directory under which per-request workspaces are created.
    pub work_dir: PathBuf,
    /// End-to-end budget per request, in seconds.
    pub timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            store: "uMy".to_string(),
            tsp_servers: None,
            signature_profile: SignatureProfile::default(),
            skip_chain_validation: false,
            cryptcp_path: PathBuf::from(DEFAULT_CRYPTCP_PATH),
            certmgr_path: PathBuf::from(DEFAULT_CERTMGR_PATH),
            work_dir: std::env::temp_dir(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl SignerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Configuration`] for an empty store name or
    /// tool path, a zero timeout, or a TSP URL without an `http(s)` scheme.
    pub fn validate(&self) -> Result<SignerSettings, SigningError> {
        let store = StoreName::new(self.store.trim()).ok_or_else(|| config_error(
            "store must not be empty",
        ))?;

        if self.cryptcp_path.as_os_str().is_empty() {
            return Err(config_error("cryptcp_path must not be empty"));
        }
        if self.certmgr_path.as_os_str().is_empty() {
            return Err(config_error("certmgr_path must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(config_error("timeout_secs must be greater than zero"));
        }

        let tsp_pool = match &self.tsp_servers {
            None => TspPool::with_defaults(),
            Some(servers) => {
                let mut endpoints = Vec::with_capacity(servers.len());
                for raw in servers {
                    let url = TspUrl::new(raw.trim())
                        .filter(TspUrl::has_http_scheme)
                        .ok_or_else(|| config_error(format!("invalid TSP server URL '{raw}'")))?;
                    endpoints.push(url);
                }
                TspPool::new(endpoints)
            }
        };

        Ok(SignerSettings {
            store,
            tsp_pool,
            default_profile: self.signature_profile,
            chain_validation: ChainValidation::from_skip_flag(self.skip_chain_validation),
            cryptcp_path: self.cryptcp_path.clone(),
            certmgr_path: self.certmgr_path.clone(),
            work_dir: self.work_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

fn config_error(message: impl Into<String>) -> SigningError {
    SigningError::Configuration {
        message: message.into(),
    }
}

/// Validated, typed signer settings.
#[derive(Debug, Clone)]
pub struct SignerSettings {
    /// Certificate store.
    pub store: StoreName,
    /// TSP endpoint pool, shared read-only by all requests.
    pub tsp_pool: TspPool,
    /// Profile for requests that do not override it.
    pub default_profile: SignatureProfile,
    /// Chain and revocation checking policy.
    pub chain_validation: ChainValidation,
    /// Path of the `cryptcp` binary.
    pub cryptcp_path: PathBuf,
    /// Path of the `certmgr` binary.
    pub certmgr_path: PathBuf,
    /// Parent directory for workspaces.
    pub work_dir: PathBuf,
    /// End-to-end budget per request.
    pub timeout: Duration,
}
