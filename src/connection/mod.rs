//! Connection layer for host communication.
//!
//! Modules never talk to a host directly; they go through the [`Connection`]
//! trait so the engine does not care how a host is reached. A
//! [`ConnectionFactory`] turns an inventory host and its resolved variables
//! into a live connection.
//!
//! Only the local transport ships with the engine. Remote transports (SSH and
//! friends) are external collaborators: they plug in by implementing
//! [`ConnectionFactory`].
//!
//! # Example
//!
//! ```rust,no_run
//! use converge::connection::{Connection, ExecuteOptions, LocalConnection};
//!
//! # async fn demo() -> converge::connection::ConnectionResult<()> {
//! let conn = LocalConnection::with_identifier("localhost");
//! let result = conn
//!     .execute("uname -a", Some(ExecuteOptions::new().with_timeout(10)))
//!     .await?;
//! println!("{}", result.stdout);
//! # Ok(())
//! # }
//! ```

/// Local execution connection implementation.
pub mod local;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use local::{LocalConnection, LocalConnectionFactory};

use crate::vars::HostVars;

/// Errors that can occur during connection operations.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The host could not be reached at all.
    #[error("Host '{host}' is unreachable: {message}")]
    Unreachable { host: String, message: String },

    /// Failed to establish initial connection to the host.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Command execution failed (not to be confused with non-zero exit code).
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// File upload or download operation failed.
    #[error("File transfer failed: {0}")]
    TransferFailed(String),

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConnectionError {
    /// Unreachable errors mean no further task can even be attempted on the
    /// host, as opposed to a single operation failing.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ConnectionError::Unreachable { .. }
                | ConnectionError::ConnectionFailed(_)
                | ConnectionError::ConnectionClosed
        )
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The result of executing a command on a connection.
///
/// # Example
///
/// ```rust
/// use converge::connection::CommandResult;
///
/// let result = CommandResult::success("Hello".into(), String::new());
/// assert!(result.success);
/// assert_eq!(result.exit_code, 0);
///
/// let failed = CommandResult::failure(1, String::new(), "error".into());
/// assert!(!failed.success);
/// ```
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code of the command (0 typically indicates success).
    pub exit_code: i32,
    /// Content written to standard output.
    pub stdout: String,
    /// Content written to standard error.
    pub stderr: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a new successful command result
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr,
            success: true,
        }
    }

    /// Create a new failed command result
    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
        }
    }
}

/// Options for command execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Working directory for the command
    pub cwd: Option<String>,
    /// Timeout in seconds (None for no timeout)
    pub timeout: Option<u64>,
}

impl ExecuteOptions {
    /// Create new execute options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for writing files
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// File mode (permissions) to set
    pub mode: Option<u32>,
    /// Create parent directories if they don't exist
    pub create_dirs: bool,
}

impl TransferOptions {
    /// Create new transfer options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set file mode
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Enable directory creation
    pub fn with_create_dirs(mut self) -> Self {
        self.create_dirs = true;
        self
    }
}

/// File metadata as seen through a connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStat {
    /// File size in bytes
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    /// Is this a directory?
    pub is_dir: bool,
    /// Is this a regular file?
    pub is_file: bool,
    /// Is this a symbolic link?
    pub is_symlink: bool,
}

/// The main connection trait that all transport implementations must implement
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection identifier (usually the inventory host name)
    fn identifier(&self) -> &str;

    /// Execute a command on the host
    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult>;

    /// Write content to a file on the host
    async fn upload_content(
        &self,
        content: &[u8],
        remote_path: &Path,
        options: Option<TransferOptions>,
    ) -> ConnectionResult<()>;

    /// Read a file from the host
    async fn download_content(&self, remote_path: &Path) -> ConnectionResult<Vec<u8>>;

    /// Check if a path exists on the host
    async fn path_exists(&self, path: &Path) -> ConnectionResult<bool>;

    /// Check if a path is a directory on the host
    async fn is_directory(&self, path: &Path) -> ConnectionResult<bool>;

    /// Get file metadata; `None` when the path does not exist
    async fn stat(&self, path: &Path) -> ConnectionResult<Option<FileStat>>;

    /// Create a directory (and its parents)
    async fn create_dir(&self, path: &Path, mode: Option<u32>) -> ConnectionResult<()>;

    /// Remove a file, or a directory tree
    async fn remove(&self, path: &Path) -> ConnectionResult<()>;

    /// Change permission bits
    async fn set_mode(&self, path: &Path, mode: u32) -> ConnectionResult<()>;

    /// Close the connection
    async fn close(&self) -> ConnectionResult<()>;
}

/// Opens connections for inventory hosts.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Connect to `host`, using its resolved variables to pick a transport.
    ///
    /// Failing here marks the host unreachable for the rest of the play.
    async fn connect(&self, host: &str, vars: &HostVars) -> ConnectionResult<Arc<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_success() {
        let result = CommandResult::success("output".to_string(), String::new());
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "output");
    }

    #[test]
    fn test_command_result_failure() {
        let result = CommandResult::failure(2, "out".to_string(), "err".to_string());
        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stderr, "err");
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(ConnectionError::Unreachable {
            host: "web1".into(),
            message: "no route".into()
        }
        .is_unreachable());
        assert!(ConnectionError::ConnectionClosed.is_unreachable());
        assert!(!ConnectionError::Timeout(5).is_unreachable());
        assert!(!ConnectionError::ExecutionFailed("x".into()).is_unreachable());
    }

    #[test]
    fn test_options_builders() {
        let exec = ExecuteOptions::new().with_timeout(3);
        assert_eq!(exec.cwd, None);
        assert_eq!(exec.timeout, Some(3));

        let transfer = TransferOptions::new().with_mode(0o644).with_create_dirs();
        assert_eq!(transfer.mode, Some(0o644));
        assert!(transfer.create_dirs);
    }
}
