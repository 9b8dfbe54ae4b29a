//! Local connection module
//!
//! Runs commands and file operations on the machine the engine itself runs
//! on. A host can be confined to a directory with the `converge_root`
//! variable: every path the modules hand over is then resolved beneath that
//! root, which keeps throwaway runs (and the test-suite) away from the real
//! filesystem.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{
    CommandResult, Connection, ConnectionError, ConnectionFactory, ConnectionResult,
    ExecuteOptions, FileStat, TransferOptions,
};
use crate::inventory::host::{CONNECTION_VAR, ROOT_VAR};
use crate::vars::HostVars;

/// Local connection for executing commands on localhost
#[derive(Debug, Clone)]
pub struct LocalConnection {
    identifier: String,
    root: Option<PathBuf>,
}

impl LocalConnection {
    /// Create a new local connection
    pub fn new() -> Self {
        Self::with_identifier("localhost")
    }

    /// Create a local connection with a custom identifier
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            root: None,
        }
    }

    /// Create a local connection whose file operations live under `root`
    pub fn rooted(identifier: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            root: Some(root.into()),
        }
    }

    /// The directory paths are confined to, if any
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Map a module-visible path onto the local filesystem.
    ///
    /// With a root set, absolute paths are re-anchored under it and `..`
    /// components never climb above it.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let Some(root) = &self.root else {
            return path.to_path_buf();
        };

        let mut resolved = root.clone();
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    resolved.pop();
                    depth -= 1;
                }
                _ => {}
            }
        }
        resolved
    }

    fn build_command(&self, command: &str, options: &ExecuteOptions) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);

        match (&options.cwd, &self.root) {
            (Some(cwd), _) => {
                cmd.current_dir(self.resolve(Path::new(cwd)));
            }
            (None, Some(root)) => {
                cmd.current_dir(root);
            }
            (None, None) => {}
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

impl Default for LocalConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        let options = options.unwrap_or_default();
        debug!(host = %self.identifier, command = %command, "Executing local command");

        let mut cmd = self.build_command(command, &options);
        let child = cmd.spawn().map_err(|e| {
            ConnectionError::ExecutionFailed(format!("Failed to spawn command: {}", e))
        })?;

        let output = match options.timeout {
            Some(secs) => {
                tokio::time::timeout(std::time::Duration::from_secs(secs), child.wait_with_output())
                    .await
                    .map_err(|_| ConnectionError::Timeout(secs))?
            }
            None => child.wait_with_output().await,
        }
        .map_err(|e| ConnectionError::ExecutionFailed(format!("Failed to wait for command: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        trace!(exit_code = %exit_code, "Command completed");

        if output.status.success() {
            Ok(CommandResult::success(stdout, stderr))
        } else {
            Ok(CommandResult::failure(exit_code, stdout, stderr))
        }
    }

    async fn upload_content(
        &self,
        content: &[u8],
        remote_path: &Path,
        options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        let options = options.unwrap_or_default();
        let target = self.resolve(remote_path);
        debug!(path = %target.display(), size = content.len(), "Writing local file");

        if options.create_dirs {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ConnectionError::TransferFailed(format!(
                        "Failed to create parent directories for {}: {}",
                        target.display(),
                        e
                    ))
                })?;
            }
        }

        tokio::fs::write(&target, content).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to write {}: {}", target.display(), e))
        })?;

        if let Some(mode) = options.mode {
            set_permissions(&target, mode).await?;
        }

        Ok(())
    }

    async fn download_content(&self, remote_path: &Path) -> ConnectionResult<Vec<u8>> {
        let target = self.resolve(remote_path);
        trace!(path = %target.display(), "Reading local file");
        tokio::fs::read(&target).await.map_err(|e| {
            ConnectionError::TransferFailed(format!("Failed to read {}: {}", target.display(), e))
        })
    }

    async fn path_exists(&self, path: &Path) -> ConnectionResult<bool> {
        Ok(tokio::fs::symlink_metadata(self.resolve(path)).await.is_ok())
    }

    async fn is_directory(&self, path: &Path) -> ConnectionResult<bool> {
        match tokio::fs::metadata(self.resolve(path)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ConnectionError::IoError(e)),
        }
    }

    async fn stat(&self, path: &Path) -> ConnectionResult<Option<FileStat>> {
        let target = self.resolve(path);
        let meta = match tokio::fs::symlink_metadata(&target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConnectionError::IoError(e)),
        };

        Ok(Some(FileStat {
            size: meta.len(),
            mode: mode_bits(&meta),
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            is_symlink: meta.file_type().is_symlink(),
        }))
    }

    async fn create_dir(&self, path: &Path, mode: Option<u32>) -> ConnectionResult<()> {
        let target = self.resolve(path);
        debug!(path = %target.display(), "Creating local directory");
        tokio::fs::create_dir_all(&target).await?;
        if let Some(mode) = mode {
            set_permissions(&target, mode).await?;
        }
        Ok(())
    }

    async fn remove(&self, path: &Path) -> ConnectionResult<()> {
        let target = self.resolve(path);
        debug!(path = %target.display(), "Removing local path");
        let meta = match tokio::fs::symlink_metadata(&target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ConnectionError::IoError(e)),
        };
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        Ok(())
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> ConnectionResult<()> {
        set_permissions(&self.resolve(path), mode).await
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: u32) -> ConnectionResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, perms).await.map_err(|e| {
        ConnectionError::TransferFailed(format!(
            "Failed to set permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: u32) -> ConnectionResult<()> {
    Ok(())
}

/// Factory that only knows how to reach the local machine.
///
/// Hosts that ask for any other transport through `converge_connection` are
/// reported unreachable.
#[derive(Debug, Clone, Default)]
pub struct LocalConnectionFactory {
    default_root: Option<PathBuf>,
}

impl LocalConnectionFactory {
    /// Create a factory with no root confinement
    pub fn new() -> Self {
        Self::default()
    }

    /// Confine hosts without their own `converge_root` beneath `root`
    pub fn with_default_root(root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: Some(root.into()),
        }
    }
}

#[async_trait]
impl ConnectionFactory for LocalConnectionFactory {
    async fn connect(&self, host: &str, vars: &HostVars) -> ConnectionResult<Arc<dyn Connection>> {
        if let Some(kind) = vars.get(CONNECTION_VAR) {
            let kind = kind.as_str().unwrap_or_default();
            if kind != "local" {
                return Err(ConnectionError::Unreachable {
                    host: host.to_string(),
                    message: format!("no transport available for connection type '{}'", kind),
                });
            }
        }

        let root = vars
            .get(ROOT_VAR)
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| self.default_root.clone());

        let conn = match root {
            Some(root) => {
                if !tokio::fs::metadata(&root).await.map(|m| m.is_dir()).unwrap_or(false) {
                    return Err(ConnectionError::Unreachable {
                        host: host.to_string(),
                        message: format!("root directory {} does not exist", root.display()),
                    });
                }
                LocalConnection::rooted(host, root)
            }
            None => LocalConnection::with_identifier(host),
        };

        debug!(host = %host, root = ?conn.root(), "Opened local connection");
        Ok(Arc::new(conn))
    }
}
