//! Certificate store management through `certmgr`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use signing::{Invocation, Pin, ProcessOutput, ProcessRunner, SignerSettings, StoreName, Thumbprint};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::TokioProcessRunner;

/// Errors from certificate store operations.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// Installing a PFX container failed.
    #[error("certificate installation failed: {message}")]
    Installation {
        /// Failure detail.
        message: String,
    },

    /// Deleting a certificate failed.
    #[error("certificate deletion failed: {message}")]
    Deletion {
        /// Failure detail.
        message: String,
    },

    /// Listing the store failed.
    #[error("certmgr list: {message}")]
    Listing {
        /// Failure detail.
        message: String,
    },
}

/// Lists, installs and deletes certificates in one store.
#[derive(Clone)]
pub struct CertificateManager {
    certmgr_path: PathBuf,
    store: StoreName,
    tmp_dir: PathBuf,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for CertificateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateManager")
            .field("certmgr_path", &self.certmgr_path)
            .field("store", &self.store)
            .field("tmp_dir", &self.tmp_dir)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CertificateManager {
    /// Creates a manager running `certmgr_path` against `store`.
    ///
    /// PFX files are staged in `tmp_dir` for the duration of an install.
    pub fn new(
        certmgr_path: impl Into<PathBuf>,
        store: StoreName,
        tmp_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            certmgr_path: certmgr_path.into(),
            store,
            tmp_dir: tmp_dir.into(),
            timeout,
            runner: Arc::new(TokioProcessRunner::new()),
        }
    }

    /// Creates a manager from validated signer settings.
    pub fn from_settings(settings: &SignerSettings) -> Self {
        Self::new(
            settings.certmgr_path.clone(),
            settings.store.clone(),
            settings.work_dir.clone(),
            settings.timeout,
        )
    }

    /// Replaces the process runner.
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Returns the raw `certmgr -list` output for the store.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Listing`] if `certmgr` fails.
    #[instrument(skip(self, cancel), fields(store = %self.store))]
    pub async fn list(&self, cancel: &CancellationToken) -> Result<String, CertificateError> {
        let args = vec![
            "-list".to_string(),
            "-store".to_string(),
            self.store.to_string(),
        ];
        let output = self.run(&args, cancel).await;
        match output.exit_error {
            None => Ok(output.stdout),
            Some(status) => Err(CertificateError::Listing {
                message: format!("{status}, stderr: {}", output.stderr),
            }),
        }
    }

    /// Returns `true` if the store listing mentions `thumbprint`,
    /// ignoring case. A failed listing counts as not installed.
    #[instrument(skip(self, cancel), fields(store = %self.store, thumbprint = %thumbprint))]
    pub async fn is_installed(&self, thumbprint: &Thumbprint, cancel: &CancellationToken) -> bool {
        match self.list(cancel).await {
            Ok(listing) => listing
                .to_lowercase()
                .contains(&thumbprint.as_str().to_lowercase()),
            Err(e) => {
                debug!(error = %e, "listing failed, treating certificate as absent");
                false
            }
        }
    }

    /// Installs a base64-encoded PFX container protected by `pin`.
    ///
    /// The container keeps the same PIN after installation.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Installation`] if the input is not valid
    /// base64, the staging file cannot be written, or `certmgr` fails.
    #[instrument(skip_all, fields(store = %self.store))]
    pub async fn install(
        &self,
        cert_base64: &str,
        pin: &Pin,
        cancel: &CancellationToken,
    ) -> Result<(), CertificateError> {
        let der = base64::engine::general_purpose::STANDARD
            .decode(cert_base64.trim())
            .map_err(|e| installation(format!("base64 decode: {e}")))?;

        let tmp_dir = self.tmp_dir.clone();
        let staged = tokio::task::spawn_blocking(move || stage_pfx(&tmp_dir, &der))
            .await
            .map_err(|e| installation(format!("create temp file: {e}")))??;

        let args = vec![
            "-install".to_string(),
            "-pfx".to_string(),
            "-store".to_string(),
            self.store.to_string(),
            "-file".to_string(),
            staged.path().to_string_lossy().into_owned(),
            "-pin".to_string(),
            pin.expose().to_string(),
            "-newpin".to_string(),
            pin.expose().to_string(),
        ];
        let output = self.run(&args, cancel).await;
        drop(staged);

        match output.exit_error {
            None => {
                info!("certificate installed");
                Ok(())
            }
            Some(status) => Err(installation(format!(
                "certmgr: {status}, stderr: {}",
                output.stderr
            ))),
        }
    }

    /// Deletes the certificate identified by `thumbprint`.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Deletion`] if `certmgr` fails.
    #[instrument(skip(self, cancel), fields(store = %self.store, thumbprint = %thumbprint))]
    pub async fn delete(
        &self,
        thumbprint: &Thumbprint,
        cancel: &CancellationToken,
    ) -> Result<(), CertificateError> {
        let args = vec![
            "-delete".to_string(),
            "-store".to_string(),
            self.store.to_string(),
            "-thumbprint".to_string(),
            thumbprint.to_string(),
        ];
        let output = self.run(&args, cancel).await;
        match output.exit_error {
            None => {
                info!("certificate deleted");
                Ok(())
            }
            Some(status) => Err(CertificateError::Deletion {
                message: format!("certmgr: {status}, stderr: {}", output.stderr),
            }),
        }
    }

    async fn run(&self, args: &[String], cancel: &CancellationToken) -> ProcessOutput {
        self.runner
            .run(Invocation {
                program: &self.certmgr_path,
                args,
                workdir: &self.tmp_dir,
                timeout: self.timeout,
                cancel,
            })
            .await
    }
}

fn installation(message: String) -> CertificateError {
    CertificateError::Installation { message }
}

fn stage_pfx(
    tmp_dir: &std::path::Path,
    der: &[u8],
) -> Result<tempfile::NamedTempFile, CertificateError> {
    let mut file = tempfile::Builder::new()
        .prefix("cert_")
        .suffix(".p12")
        .tempfile_in(tmp_dir)
        .map_err(|e| installation(format!("create temp file: {e}")))?;
    file.write_all(der)
        .and_then(|()| file.flush())
        .map_err(|e| installation(format!("write file: {e}")))?;
    Ok(file)
}
