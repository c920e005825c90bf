//! Per-request workspaces in temporary directories.
//!
//! Each workspace is a fresh `cprov_*` directory created with `tempfile`, so
//! concurrent requests never share files. The directory is removed by
//! [`Workspace::release`], or by `TempDir`'s `Drop` if the owning future is
//! dropped first.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use signing::{SigningError, Workspace, WorkspaceProvider, INPUT_FILE_NAME};
use tempfile::TempDir;
use tracing::debug;

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "cprov_";

/// Creates workspaces under a fixed parent directory.
#[derive(Debug, Clone)]
pub struct TempWorkspaceProvider {
    root: PathBuf,
}

impl TempWorkspaceProvider {
    /// Creates a provider placing workspaces under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl WorkspaceProvider for TempWorkspaceProvider {
    async fn acquire(&self, input: &[u8]) -> Result<Box<dyn Workspace>, SigningError> {
        let root = self.root.clone();
        let input = input.to_vec();
        let dir = tokio::task::spawn_blocking(move || create_workspace(&root, &input))
            .await
            .map_err(|e| {
                SigningError::workspace(
                    "create work directory",
                    None,
                    std::io::Error::other(e),
                )
            })??;

        let path = dir.path().to_path_buf();
        debug!(work_dir = %path.display(), "workspace created");
        Ok(Box::new(TempWorkspace {
            path,
            dir: Some(dir),
        }))
    }
}

fn create_workspace(root: &Path, input: &[u8]) -> Result<TempDir, SigningError> {
    let dir = tempfile::Builder::new()
        .prefix(WORKSPACE_PREFIX)
        .tempdir_in(root)
        .map_err(|e| {
            SigningError::workspace("create work directory", Some(root.to_path_buf()), e)
        })?;

    let input_path = dir.path().join(INPUT_FILE_NAME);
    write_private(&input_path, input)
        .map_err(|e| SigningError::workspace("write data file", Some(input_path), e))?;
    Ok(dir)
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.flush()
}

/// A workspace directory owned by one request.
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

#[async_trait]
impl Workspace for TempWorkspace {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn exists(&self, name: &str) -> bool {
        tokio::fs::try_exists(self.path.join(name))
            .await
            .unwrap_or(false)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, SigningError> {
        let path = self.path.join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| SigningError::workspace("read signature file", Some(path), e))
    }

    async fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.path).await else {
            return names;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    async fn release(mut self: Box<Self>) -> Result<(), SigningError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| {
                SigningError::workspace(
                    "remove work directory",
                    Some(path.clone()),
                    std::io::Error::other(e),
                )
            })?
            .map_err(|e| SigningError::workspace("remove work directory", Some(path.clone()), e))?;
        debug!(work_dir = %path.display(), "workspace removed");
        Ok(())
    }
}
