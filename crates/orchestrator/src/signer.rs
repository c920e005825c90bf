//! `DocumentSigner`: drives one signing request end to end.
//!
//! Workspace → command (+ TSP endpoint) → process → classification → retry,
//! under a single deadline covering every attempt. The workspace is released
//! on every path; if the signing future is dropped mid-flight the workspace's
//! own `Drop` removes it.

use std::sync::Arc;
use std::time::Duration;

use signing::{
    classify, output_file_name, AttachMode, CommandBuilder, ExecutionResult, ExitError, Field,
    Invocation, Logger, Payload, Pin, ProcessRunner, RandomSource, SignatureArtifact,
    SignatureProfile, SignerSettings, SigningError, SigningRequest, ThreadRandom, Thumbprint,
    Timestamp, TracingLogger, Workspace, WorkspaceProvider,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::retry::{Decision, RetryController, MAX_ATTEMPTS};

/// End-to-end time budget for one request.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    fn exceeded(&self, attempts: u32) -> SigningError {
        SigningError::DeadlineExceeded {
            budget: self.budget,
            attempts,
        }
    }
}

/// Signs documents by driving `cryptcp` through the configured ports.
///
/// Safe to share across tasks: requests never share mutable state, only the
/// read-only settings (including the TSP pool).
pub struct DocumentSigner {
    settings: SignerSettings,
    commands: CommandBuilder,
    runner: Arc<dyn ProcessRunner>,
    workspaces: Arc<dyn WorkspaceProvider>,
    logger: Arc<dyn Logger>,
    random: Arc<dyn RandomSource>,
}

impl DocumentSigner {
    /// Creates a signer logging through [`TracingLogger`] and selecting TSP
    /// endpoints with [`ThreadRandom`].
    pub fn new(
        settings: SignerSettings,
        runner: Arc<dyn ProcessRunner>,
        workspaces: Arc<dyn WorkspaceProvider>,
    ) -> Self {
        let commands = CommandBuilder::new(settings.store.clone(), settings.chain_validation);
        Self {
            settings,
            commands,
            runner,
            workspaces,
            logger: Arc::new(TracingLogger),
            random: Arc::new(ThreadRandom),
        }
    }

    /// Replaces the logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replaces the randomness source used for TSP endpoint selection.
    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Signs a base64-encoded payload and returns the base64-encoded
    /// signature.
    ///
    /// `attach` of `None` or `Some(false)` produces a detached signature;
    /// `profile` of `None` uses the configured default.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidInput`] for an empty thumbprint or
    /// malformed base64 (no process is started), otherwise whatever
    /// [`DocumentSigner::sign`] returns.
    #[tracing::instrument(name = "sign_base64", skip_all)]
    pub async fn sign_base64(
        &self,
        thumbprint: &str,
        pin: &str,
        data_base64: &str,
        attach: Option<bool>,
        profile: Option<SignatureProfile>,
        cancel: &CancellationToken,
    ) -> Result<String, SigningError> {
        let thumbprint = Thumbprint::new(thumbprint).ok_or_else(|| SigningError::InvalidInput {
            message: "thumbprint must not be empty".to_string(),
        })?;
        let payload = Payload::from_base64(data_base64)?;

        let mut request = SigningRequest::new(thumbprint, Pin::new(pin), payload)
            .with_attach_mode(AttachMode::from_attach_flag(attach));
        if let Some(profile) = profile {
            request = request.with_profile(profile);
        }

        let artifact = self.sign(&request, cancel).await?;
        Ok(artifact.to_base64())
    }

    /// Signs `request` within the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`DocumentSigner::sign_until`].
    pub async fn sign(
        &self,
        request: &SigningRequest,
        cancel: &CancellationToken,
    ) -> Result<SignatureArtifact, SigningError> {
        let deadline = Instant::now() + self.settings.timeout;
        self.sign_until(request, deadline, cancel).await
    }

    /// Signs `request`, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// - [`SigningError::Configuration`]: timestamped profile with an empty
    ///   TSP pool; no workspace is created.
    /// - [`SigningError::DeadlineExceeded`] / [`SigningError::Cancelled`]:
    ///   raised before, during, or between attempts.
    /// - [`SigningError::Workspace`]: the workspace could not be created,
    ///   read, or removed.
    /// - [`SigningError::ToolFailure`]: first non-retryable failure.
    /// - [`SigningError::RetriesExhausted`]: every attempt hit a transient
    ///   TSP failure.
    #[tracing::instrument(
        name = "sign_document",
        skip_all,
        fields(request_id = %request.id, thumbprint = %request.thumbprint)
    )]
    pub async fn sign_until(
        &self,
        request: &SigningRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<SignatureArtifact, SigningError> {
        let deadline = Deadline {
            at: deadline,
            budget: deadline.saturating_duration_since(Instant::now()),
        };
        let profile = request.profile.unwrap_or(self.settings.default_profile);

        if profile.requires_timestamp() && self.settings.tsp_pool.is_empty() {
            let err = SigningError::Configuration {
                message: "TSP server is required for CAdES-T signature type but none configured"
                    .to_string(),
            };
            self.logger.error(
                "signature rejected",
                &[
                    Field::new("request_id", request.id.to_string()),
                    Field::new("error", err.to_string()),
                ],
            );
            return Err(err);
        }

        check_live(cancel, &deadline, 0)?;

        let workspace = self.workspaces.acquire(request.payload.as_bytes()).await?;
        let workspace_path = workspace.path().display().to_string();

        let result = self
            .run_attempts(workspace.as_ref(), request, profile, &deadline, cancel)
            .await;
        let released = workspace.release().await;

        match (result, released) {
            (Ok(artifact), Ok(())) => Ok(artifact),
            (Ok(_), Err(err)) => {
                self.logger.error(
                    "workspace cleanup failed",
                    &[
                        Field::new("work_dir", workspace_path),
                        Field::new("error", err.to_string()),
                    ],
                );
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => {
                self.logger.error(
                    "workspace cleanup failed",
                    &[
                        Field::new("work_dir", workspace_path),
                        Field::new("error", cleanup.to_string()),
                    ],
                );
                Err(err)
            }
        }
    }

    async fn run_attempts(
        &self,
        workspace: &dyn Workspace,
        request: &SigningRequest,
        profile: SignatureProfile,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> Result<SignatureArtifact, SigningError> {
        let output_name = output_file_name(request.attach_mode);
        let expected_output = workspace.file_path(&output_name);
        let mut controller = RetryController::new();

        loop {
            let attempt = controller.attempt();
            check_live(cancel, deadline, attempt - 1)?;

            // Re-selected per attempt so a retry can fail over to another TSP.
            let tsp = if profile.requires_timestamp() {
                self.settings.tsp_pool.select(self.random.as_ref())
            } else {
                None
            };
            let args = self.commands.build(request, profile, tsp)?;

            self.logger.debug(
                "cryptcp args",
                &[
                    Field::new("attempt", attempt),
                    Field::new("args", args.redacted()),
                ],
            );

            let mut fields = vec![
                Field::new("request_id", request.id.to_string()),
                Field::new("thumbprint", request.thumbprint.to_string()),
                Field::new("work_dir", workspace.path().display().to_string()),
                Field::new("sign_type", profile.to_string()),
                Field::new("attach_mode", request.attach_mode.to_string()),
                Field::new("skip_chain_validation", !self.chain_validated()),
                Field::new("attempt", attempt),
            ];
            if let Some(url) = tsp {
                fields.push(Field::new("tsp_url", url.to_string()));
                fields.push(Field::new("tsp_servers_count", self.settings.tsp_pool.len()));
            }
            self.logger.info("cryptcp starting", &fields);

            let invocation = Invocation {
                program: &self.settings.cryptcp_path,
                args: args.as_slice(),
                workdir: workspace.path(),
                timeout: deadline.remaining(),
                cancel,
            };

            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SigningError::Cancelled { attempts: attempt }),
                _ = tokio::time::sleep_until(deadline.at) => return Err(deadline.exceeded(attempt)),
                output = self.runner.run(invocation) => output,
            };

            match output.exit_error {
                Some(ExitError::TimedOut { .. }) => return Err(deadline.exceeded(attempt)),
                Some(ExitError::Cancelled) => {
                    return Err(SigningError::Cancelled { attempts: attempt })
                }
                _ => {}
            }

            self.logger.info(
                "cryptcp completed",
                &[
                    Field::new("attempt", attempt),
                    Field::new("duration", output.duration),
                    Field::new("has_error", output.exit_error.is_some()),
                    Field::new("has_stdout", !output.stdout.is_empty()),
                    Field::new("has_stderr", !output.stderr.is_empty()),
                ],
            );
            if !output.stdout.is_empty() || !output.stderr.is_empty() {
                self.logger.debug(
                    "cryptcp output",
                    &[
                        Field::new("attempt", attempt),
                        Field::new("stdout", output.stdout.clone()),
                        Field::new("stderr", output.stderr.clone()),
                        Field::new("duration", output.duration),
                    ],
                );
            }

            let output_exists = workspace.exists(&output_name).await;
            let workspace_files = if output_exists {
                Vec::new()
            } else {
                workspace.list().await
            };
            let result = ExecutionResult {
                attempt,
                output,
                output_exists,
                workspace_files,
            };

            match controller.record(classify(&result, &expected_output)) {
                Decision::Succeeded { attempt } => {
                    self.logger.info(
                        "signature created successfully",
                        &[
                            Field::new("attempt", attempt),
                            Field::new("sign_file", expected_output.display().to_string()),
                        ],
                    );
                    let der = workspace.read(&output_name).await?;
                    return Ok(SignatureArtifact {
                        der,
                        attempts: attempt,
                        tsp_url: tsp.cloned(),
                        signed_at: Timestamp::now(),
                    });
                }
                Decision::Retry {
                    next_attempt,
                    backoff,
                    diagnostic,
                } => {
                    self.logger.warn(
                        "detected HTTP error from TSP server, will retry",
                        &[
                            Field::new("attempt", attempt),
                            Field::new("max_attempts", MAX_ATTEMPTS),
                            Field::new("error", diagnostic.to_string()),
                        ],
                    );
                    self.logger.warn(
                        "retrying signature",
                        &[
                            Field::new("attempt", next_attempt),
                            Field::new("max_attempts", MAX_ATTEMPTS),
                            Field::new("backoff", backoff),
                        ],
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(SigningError::Cancelled { attempts: attempt })
                        }
                        _ = tokio::time::sleep_until(deadline.at) => {
                            return Err(deadline.exceeded(attempt))
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Decision::Exhausted {
                    attempts,
                    diagnostic,
                } => {
                    self.logger.error(
                        "all retry attempts exhausted",
                        &[
                            Field::new("attempt", attempts),
                            Field::new("max_attempts", MAX_ATTEMPTS),
                            Field::new("last_error", diagnostic.to_string()),
                        ],
                    );
                    return Err(SigningError::RetriesExhausted {
                        attempts,
                        diagnostic: Box::new(diagnostic),
                    });
                }
                Decision::Fatal { diagnostic } => {
                    self.logger.warn(
                        "non-HTTP error detected, stopping retries",
                        &[
                            Field::new("attempt", attempt),
                            Field::new("error", diagnostic.to_string()),
                        ],
                    );
                    return Err(SigningError::ToolFailure {
                        diagnostic: Box::new(diagnostic),
                    });
                }
            }
        }
    }

    fn chain_validated(&self) -> bool {
        self.settings.chain_validation == signing::ChainValidation::Enabled
    }
}

fn check_live(
    cancel: &CancellationToken,
    deadline: &Deadline,
    attempts: u32,
) -> Result<(), SigningError> {
    if cancel.is_cancelled() {
        return Err(SigningError::Cancelled { attempts });
    }
    if deadline.is_expired() {
        return Err(deadline.exceeded(attempts));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use signing::{
        AttachMode, ErrorCategory, FailureReason, Payload, Pin, SignatureProfile, SigningError,
        SigningRequest, Thumbprint, TspPool, TspUrl,
    };
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::DocumentSigner;
    use crate::test_support::{
        settings, CyclingRandom, RecordingLogger, RecordingWorkspaces, ScriptedRunner, Step,
        TEST_PIN,
    };

    struct Harness {
        signer: Arc<DocumentSigner>,
        runner: Arc<ScriptedRunner>,
        workspaces: Arc<RecordingWorkspaces>,
        logger: Arc<RecordingLogger>,
    }

    fn harness(steps: Vec<Step>) -> Harness {
        harness_with_pool(steps, TspPool::with_defaults())
    }

    fn harness_with_pool(steps: Vec<Step>, pool: TspPool) -> Harness {
        let runner = Arc::new(ScriptedRunner::new(steps));
        let workspaces = Arc::new(RecordingWorkspaces::new());
        let logger = Arc::new(RecordingLogger::default());
        let mut settings = settings();
        settings.tsp_pool = pool;
        let signer = DocumentSigner::new(settings, runner.clone(), workspaces.clone())
            .with_logger(logger.clone())
            .with_random(Arc::new(CyclingRandom::default()));
        Harness {
            signer: Arc::new(signer),
            runner,
            workspaces,
            logger,
        }
    }

    fn request(payload: &[u8]) -> SigningRequest {
        SigningRequest::new(
            Thumbprint::new("0123abcd").unwrap(),
            Pin::new(TEST_PIN),
            Payload::new(payload.to_vec()),
        )
    }

    fn assert_all_released(workspaces: &RecordingWorkspaces) {
        for path in workspaces.acquired() {
            assert!(!path.exists(), "workspace {} still exists", path.display());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_runs_once() {
        let h = harness(vec![Step::success()]);

        let artifact = h
            .signer
            .sign(&request(b"invoice"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(h.runner.call_count(), 1);
        assert_eq!(artifact.der, b"SIGNED:invoice".to_vec());
        assert_eq!(artifact.attempts, 1);
        assert!(artifact.tsp_url.is_some());
        assert_eq!(h.workspaces.acquired().len(), 1);
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_linear_backoff() {
        let h = harness(vec![
            Step::http_error(),
            Step::http_error(),
            Step::success(),
        ]);

        let artifact = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap();

        let calls = h.runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(artifact.attempts, 3);
        let first_gap = calls[1].started - calls[0].started;
        let second_gap = calls[2].started - calls[1].started;
        assert_eq!(first_gap, Duration::from_secs(1));
        assert_eq!(second_gap, Duration::from_secs(2));
        assert!(second_gap > first_gap);
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_fails_over_to_another_endpoint() {
        let pool = TspPool::new(vec![
            TspUrl::new("http://tsa-a.example/tsp").unwrap(),
            TspUrl::new("http://tsa-b.example/tsp").unwrap(),
        ]);
        let h = harness_with_pool(vec![Step::http_error(), Step::success()], pool);

        let artifact = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap();

        let calls = h.runner.calls();
        assert!(calls[0].args.contains(&"http://tsa-a.example/tsp".to_string()));
        assert!(calls[1].args.contains(&"http://tsa-b.example/tsp".to_string()));
        assert_eq!(
            artifact.tsp_url.as_ref().map(TspUrl::as_str),
            Some("http://tsa-b.example/tsp")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_not_retried() {
        let h = harness(vec![Step::fatal_error(), Step::success()]);

        let err = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(h.runner.call_count(), 1);
        assert_eq!(err.category(), ErrorCategory::PermanentTool);
        let diagnostic = err.diagnostic().unwrap();
        assert!(diagnostic.stdout.contains("Error: invalid PIN"));
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_exhaust_after_three_attempts() {
        let h = harness(vec![
            Step::http_error(),
            Step::http_error(),
            Step::http_error(),
        ]);

        let err = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(h.runner.call_count(), 3);
        match &err {
            SigningError::RetriesExhausted { attempts, diagnostic } => {
                assert_eq!(*attempts, 3);
                assert_eq!(diagnostic.attempt, 3);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(h.logger.count_at("warn"), 4);
        assert_eq!(h.logger.count_at("error"), 1);
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_exit_without_output_file_fails() {
        let h = harness(vec![Step {
            write_output: false,
            ..Step::success()
        }]);

        let err = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap_err();

        let diagnostic = err.diagnostic().unwrap();
        assert_eq!(diagnostic.reason, FailureReason::MissingOutput);
        assert_eq!(diagnostic.workspace_files, vec!["data.txt".to_string()]);
        assert_eq!(h.runner.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attached_mode_reads_sig_output() {
        let h = harness(vec![Step::success()]);
        let req = request(b"doc")
            .with_attach_mode(AttachMode::Attached)
            .with_profile(SignatureProfile::Basic);

        let artifact = h.signer.sign(&req, &CancellationToken::new()).await.unwrap();

        let args = &h.runner.calls()[0].args;
        assert!(args.contains(&"-attached".to_string()));
        assert!(args.contains(&"-cadesbes".to_string()));
        assert!(args.ends_with(&["-fext".to_string(), ".sig".to_string()]));
        assert_eq!(artifact.tsp_url, None);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_with_timestamped_profile_is_a_configuration_error() {
        let h = harness_with_pool(vec![Step::success()], TspPool::new(Vec::new()));

        let err = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(h.runner.call_count(), 0);
        assert!(h.workspaces.acquired().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pool_is_fine_for_basic_signatures() {
        let h = harness_with_pool(vec![Step::success()], TspPool::new(Vec::new()));
        let req = request(b"doc").with_profile(SignatureProfile::Basic);

        assert!(h.signer.sign(&req, &CancellationToken::new()).await.is_ok());
        assert_eq!(h.runner.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_starts_no_process() {
        let h = harness(vec![Step::success()]);

        let err = h
            .signer
            .sign_until(&request(b"doc"), Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::DeadlineExceeded);
        assert_eq!(h.runner.call_count(), 0);
        assert!(h.workspaces.acquired().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_runs_nothing() {
        let h = harness(vec![Step::success()]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h.signer.sign(&request(b"doc"), &cancel).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert_eq!(h.runner.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_execution_aborts_and_cleans_up() {
        let h = harness(vec![Step::hang()]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = h.signer.sign(&request(b"doc"), &cancel).await.unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_execution_is_not_a_tool_error() {
        let h = harness(vec![Step::hang()]);
        let deadline = Instant::now() + Duration::from_secs(30);

        let err = h
            .signer
            .sign_until(&request(b"doc"), deadline, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::DeadlineExceeded);
        assert!(err.diagnostic().is_none());
        assert_eq!(h.runner.call_count(), 1);
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_backoff_stops_retrying() {
        let h = harness(vec![Step::http_error(), Step::success()]);
        let deadline = Instant::now() + Duration::from_millis(500);

        let err = h
            .signer
            .sign_until(&request(b"doc"), deadline, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::DeadlineExceeded);
        assert_eq!(h.runner.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_retrying() {
        let h = harness(vec![Step::http_error(), Step::success()]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let err = h.signer.sign(&request(b"doc"), &cancel).await.unwrap_err();

        assert!(
            matches!(err, SigningError::Cancelled { attempts: 1 }),
            "unexpected error {err:?}"
        );
        assert_eq!(h.runner.call_count(), 1);
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_failure_after_success_discards_the_signature() {
        let h = harness(vec![Step::success()]);
        h.workspaces.fail_next_release();

        let err = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Resource);
        assert_eq!(h.runner.call_count(), 1);
        assert_eq!(h.logger.count_at("error"), 1);
        assert!(h
            .logger
            .lines()
            .iter()
            .any(|line| line.starts_with("workspace cleanup failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_failure_after_tool_failure_keeps_the_tool_error() {
        let h = harness(vec![Step::fatal_error()]);
        h.workspaces.fail_next_release();

        let err = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SigningError::ToolFailure { .. }), "unexpected error {err:?}");
        assert_eq!(err.category(), ErrorCategory::PermanentTool);
        assert!(h
            .logger
            .lines()
            .iter()
            .any(|line| line.starts_with("workspace cleanup failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_use_distinct_workspaces() {
        let h = harness(Vec::new());
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let signer = h.signer.clone();
            tasks.spawn(async move {
                let payload = format!("document-{i}");
                let artifact = signer
                    .sign(&request(payload.as_bytes()), &CancellationToken::new())
                    .await
                    .unwrap();
                (payload, artifact)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (payload, artifact) = joined.unwrap();
            assert_eq!(artifact.der, format!("SIGNED:{payload}").into_bytes());
        }

        let acquired = h.workspaces.acquired();
        assert_eq!(acquired.len(), 8);
        let distinct: HashSet<_> = acquired.iter().collect();
        assert_eq!(distinct.len(), 8);
        assert_eq!(h.runner.call_count(), 8);
        assert_all_released(&h.workspaces);
    }

    #[tokio::test(start_paused = true)]
    async fn pin_never_reaches_the_logger() {
        let h = harness(vec![Step::http_error(), Step::fatal_error()]);

        let _ = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await;

        assert!(!h.logger.lines().is_empty());
        assert!(h.logger.lines().iter().all(|line| !line.contains(TEST_PIN)));
        assert!(h.runner.calls()[0].args.contains(&TEST_PIN.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn base64_entry_point_round_trips() {
        let h = harness(vec![Step::success()]);

        let signature = h
            .signer
            .sign_base64(
                "0123abcd",
                TEST_PIN,
                "aGVsbG8=",
                None,
                Some(SignatureProfile::Basic),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // base64("SIGNED:hello")
        assert_eq!(signature, "U0lHTkVEOmhlbGxv");
        assert!(h.runner.calls()[0].args.contains(&"-detached".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_base64_starts_no_process() {
        let h = harness(vec![Step::success()]);

        let err = h
            .signer
            .sign_base64("0123abcd", TEST_PIN, "%%%", None, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(h.runner.call_count(), 0);
        assert!(h.workspaces.acquired().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn workspace_failure_is_a_resource_error() {
        let h = harness(vec![Step::success()]);
        h.workspaces.fail_next_acquire();

        let err = h
            .signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Resource);
        assert_eq!(h.runner.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn runner_sees_workspace_as_working_directory() {
        let h = harness(vec![Step::success()]);

        h.signer
            .sign(&request(b"doc"), &CancellationToken::new())
            .await
            .unwrap();

        let call = &h.runner.calls()[0];
        assert_eq!(call.workdir, h.workspaces.acquired()[0]);
        assert_eq!(call.program, Path::new("/opt/test/cryptcp"));
    }
}
