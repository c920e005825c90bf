//! Fakes for the signing ports, shared by the orchestrator tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cryptcp::TempWorkspaceProvider;
use signing::{
    render_fields, ChainValidation, ExitError, Field, Invocation, Logger, ProcessOutput,
    ProcessRunner, RandomSource, SignatureProfile, SignerSettings, SigningError, StoreName,
    TspPool, Workspace, WorkspaceProvider, INPUT_FILE_NAME,
};
use tempfile::TempDir;
use tokio::time::Instant;

pub const TEST_PIN: &str = "pin-7f3a91";

pub fn settings() -> SignerSettings {
    SignerSettings {
        store: StoreName::new("uMy").unwrap(),
        tsp_pool: TspPool::with_defaults(),
        default_profile: SignatureProfile::Timestamped,
        chain_validation: ChainValidation::Enabled,
        cryptcp_path: PathBuf::from("/opt/test/cryptcp"),
        certmgr_path: PathBuf::from("/opt/test/certmgr"),
        work_dir: std::env::temp_dir(),
        timeout: Duration::from_secs(300),
    }
}

// ---------------------------------------------------------------------------
// Process runner
// ---------------------------------------------------------------------------

/// Scripted behaviour of one fake `cryptcp` run.
#[derive(Debug, Clone)]
pub struct Step {
    pub stdout: String,
    pub stderr: String,
    pub exit_error: Option<ExitError>,
    pub write_output: bool,
    pub hang: bool,
}

impl Step {
    pub fn success() -> Self {
        Self {
            stdout: "[ReturnCode: 0]".into(),
            stderr: String::new(),
            exit_error: None,
            write_output: true,
            hang: false,
        }
    }

    pub fn http_error() -> Self {
        Self {
            stdout: "Error: HTTP error 503 while requesting timestamp".into(),
            stderr: String::new(),
            exit_error: Some(ExitError::Exited { code: Some(1) }),
            write_output: false,
            hang: false,
        }
    }

    pub fn fatal_error() -> Self {
        Self {
            stdout: "Error: invalid PIN".into(),
            stderr: String::new(),
            exit_error: Some(ExitError::Exited { code: Some(1) }),
            write_output: false,
            hang: false,
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::success()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub started: Instant,
}

/// Plays back [`Step`]s in order; once they run out, every run succeeds.
///
/// A successful step writes `SIGNED:<input>` to the output file named by
/// the `-fext` argument.
pub struct ScriptedRunner {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation<'_>) -> ProcessOutput {
        self.calls.lock().unwrap().push(Call {
            program: invocation.program.to_path_buf(),
            args: invocation.args.to_vec(),
            workdir: invocation.workdir.to_path_buf(),
            started: Instant::now(),
        });
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Step::success);

        if step.hang {
            let exit_error = tokio::select! {
                _ = invocation.cancel.cancelled() => ExitError::Cancelled,
                _ = tokio::time::sleep(invocation.timeout) => ExitError::TimedOut {
                    after: invocation.timeout,
                },
            };
            return ProcessOutput {
                exit_error: Some(exit_error),
                stdout: String::new(),
                stderr: String::new(),
                duration: invocation.timeout,
            };
        }

        if step.write_output {
            let ext_at = invocation
                .args
                .iter()
                .position(|a| a == "-fext")
                .expect("-fext argument");
            let ext = &invocation.args[ext_at + 1];
            let input = std::fs::read(invocation.workdir.join(INPUT_FILE_NAME)).unwrap();
            let mut signed = b"SIGNED:".to_vec();
            signed.extend_from_slice(&input);
            std::fs::write(
                invocation.workdir.join(format!("{INPUT_FILE_NAME}{ext}")),
                signed,
            )
            .unwrap();
        }

        ProcessOutput {
            exit_error: step.exit_error,
            stdout: step.stdout,
            stderr: step.stderr,
            duration: Duration::from_millis(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

/// Real temp-directory workspaces under a private root, recording every
/// acquired path.
pub struct RecordingWorkspaces {
    _root: TempDir,
    inner: TempWorkspaceProvider,
    acquired: Mutex<Vec<PathBuf>>,
    fail_next: AtomicBool,
    fail_release: AtomicBool,
}

impl RecordingWorkspaces {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let inner = TempWorkspaceProvider::new(root.path());
        Self {
            _root: root,
            inner,
            acquired: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            fail_release: AtomicBool::new(false),
        }
    }

    pub fn acquired(&self) -> Vec<PathBuf> {
        self.acquired.lock().unwrap().clone()
    }

    pub fn fail_next_acquire(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The next acquired workspace removes its directory on release but
    /// still reports a failure.
    pub fn fail_next_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkspaceProvider for RecordingWorkspaces {
    async fn acquire(&self, input: &[u8]) -> Result<Box<dyn Workspace>, SigningError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SigningError::workspace(
                "create work directory",
                None,
                std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"),
            ));
        }
        let workspace = self.inner.acquire(input).await?;
        self.acquired
            .lock()
            .unwrap()
            .push(workspace.path().to_path_buf());
        if self.fail_release.swap(false, Ordering::SeqCst) {
            return Ok(Box::new(FailingRelease(workspace)));
        }
        Ok(workspace)
    }
}

struct FailingRelease(Box<dyn Workspace>);

#[async_trait]
impl Workspace for FailingRelease {
    fn path(&self) -> &Path {
        self.0.path()
    }

    async fn exists(&self, name: &str) -> bool {
        self.0.exists(name).await
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, SigningError> {
        self.0.read(name).await
    }

    async fn list(&self) -> Vec<String> {
        self.0.list().await
    }

    async fn release(self: Box<Self>) -> Result<(), SigningError> {
        let path = self.0.path().to_path_buf();
        self.0.release().await?;
        Err(SigningError::workspace(
            "remove work directory",
            Some(path),
            std::io::Error::new(std::io::ErrorKind::Other, "device or resource busy"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Logger and randomness
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLogger {
    fn push(&self, level: &'static str, message: &str, fields: &[Field]) {
        self.lines
            .lock()
            .unwrap()
            .push((level, format!("{message} {}", render_fields(fields))));
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn count_at(&self, level: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str, fields: &[Field]) {
        self.push("debug", message, fields);
    }

    fn info(&self, message: &str, fields: &[Field]) {
        self.push("info", message, fields);
    }

    fn warn(&self, message: &str, fields: &[Field]) {
        self.push("warn", message, fields);
    }

    fn error(&self, message: &str, fields: &[Field]) {
        self.push("error", message, fields);
    }
}

/// Returns 0, 1, 2, … modulo the pool size.
#[derive(Default)]
pub struct CyclingRandom(AtomicUsize);

impl RandomSource for CyclingRandom {
    fn index(&self, upper: usize) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) % upper
    }
}
