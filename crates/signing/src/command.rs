//! Argument assembly for the `cryptcp` signing tool.
//!
//! The builder is pure: the same request, profile and endpoint always produce
//! the same argument list. Endpoint selection happens outside (see
//! [`crate::tsp`]) so that a retry can pick a different one.

use crate::{
    AttachMode, ChainValidation, SignatureProfile, SigningError, SigningRequest, StoreName,
    TspUrl,
};

/// Name of the payload file inside every workspace.
pub const INPUT_FILE_NAME: &str = "data.txt";

const REDACTED: &str = "***";

/// Name of the signature file the tool writes next to the input.
pub fn output_file_name(mode: AttachMode) -> String {
    format!("{INPUT_FILE_NAME}{}", mode.file_extension())
}

/// Ordered argument list for one tool invocation.
///
/// Remembers which positions hold credentials so that [`ToolArgs::redacted`]
/// can produce a loggable copy.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolArgs {
    args: Vec<String>,
    secret_positions: Vec<usize>,
}

impl ToolArgs {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            secret_positions: Vec::new(),
        }
    }

    fn push(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    fn push_secret(&mut self, arg: impl Into<String>) {
        self.secret_positions.push(self.args.len());
        self.args.push(arg.into());
    }

    /// Arguments to pass to the process. Contains the PIN; never log this.
    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    /// Copy of the arguments with credentials masked.
    pub fn redacted(&self) -> Vec<String> {
        self.args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if self.secret_positions.contains(&i) {
                    REDACTED.to_string()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ToolArgs").field(&self.redacted()).finish()
    }
}

/// Builds `cryptcp -sign` argument lists for one store and chain policy.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    store: StoreName,
    chain_validation: ChainValidation,
}

impl CommandBuilder {
    /// Creates a builder for `store` with the given chain-validation policy.
    pub fn new(store: StoreName, chain_validation: ChainValidation) -> Self {
        Self {
            store,
            chain_validation,
        }
    }

    /// Assembles the arguments for `request`.
    ///
    /// Order: operation and store, signer and PIN, chain flags, attachment
    /// mode, `-der`, profile (with the TSP URL for CAdES-T), input file and
    /// output extension.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Configuration`] if `profile` is timestamped and
    /// no endpoint was supplied.
    pub fn build(
        &self,
        request: &SigningRequest,
        profile: SignatureProfile,
        tsp: Option<&TspUrl>,
    ) -> Result<ToolArgs, SigningError> {
        let mut args = ToolArgs::new();

        args.push("-sign");
        args.push(self.store.to_cli_option());

        args.push("-thumbprint");
        args.push(request.thumbprint.as_str());
        args.push("-pin");
        args.push_secret(request.pin.expose());

        if self.chain_validation == ChainValidation::Disabled {
            args.push("-nochain");
            args.push("-norev");
        }

        args.push(request.attach_mode.flag());
        args.push("-der");

        match profile {
            SignatureProfile::Basic => args.push("-cadesbes"),
            SignatureProfile::Timestamped => {
                let url = tsp.ok_or_else(|| SigningError::Configuration {
                    message: "TSP server is required for CAdES-T signature type but none configured"
                        .to_string(),
                })?;
                args.push("-cadest");
                args.push("-cadestsa");
                args.push(url.as_str());
            }
        }

        args.push(INPUT_FILE_NAME);
        args.push("-fext");
        args.push(request.attach_mode.file_extension());

        Ok(args)
    }
}
