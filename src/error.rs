//! Error types for converge.
//!
//! Each area of the engine has its own `thiserror` enum; [`Error`] gathers
//! them for callers that drive a whole run. Errors that surface here are
//! run-level problems. Per-host failures never do: they are recorded as
//! `failed`/`unreachable` results in the report instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::connection::ConnectionError;
use crate::executor::ExecutorError;
use crate::inventory::InventoryError;
use crate::modules::ModuleError;
use crate::playbook::PlaybookError;
use crate::report::ExitStatus;

/// Result type alias for converge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for converge.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Playbook(#[from] PlaybookError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad `-e` argument or extra-vars file.
    #[error("Invalid extra vars '{input}': {message}")]
    ExtraVars { input: String, message: String },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn extra_vars(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExtraVars {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Structural errors abort a run before any host is touched: bad
    /// inventories and selectors, syntax, conditions, configuration.
    pub fn is_structural(&self) -> bool {
        match self {
            Error::Inventory(e) => e.is_structural(),
            Error::Executor(e) => e.is_structural(),
            Error::Playbook(_)
            | Error::Module(_)
            | Error::Config(_)
            | Error::ExtraVars { .. }
            | Error::FileNotFound(_)
            | Error::YamlParse(_)
            | Error::TomlParse(_) => true,
            Error::Connection(_) | Error::Io(_) | Error::Json(_) | Error::Internal(_) => false,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        if self.is_structural() {
            ExitStatus::InvalidInput.code()
        } else if matches!(self, Error::Connection(e) if e.is_unreachable()) {
            ExitStatus::HostsUnreachable.code()
        } else {
            ExitStatus::InternalError.code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors_map_to_config_exit() {
        let err: Error = InventoryError::CyclicGroup {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        assert!(err.is_structural());
        assert_eq!(err.exit_code(), 4);

        let err: Error = ExecutorError::UnknownStartTask("deploy".into()).into();
        assert_eq!(err.exit_code(), 4);

        assert_eq!(Error::config("forks must be positive").exit_code(), 4);
    }

    #[test]
    fn test_runtime_errors() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!io.is_structural());
        assert_eq!(io.exit_code(), 1);

        let unreachable = Error::Connection(ConnectionError::Unreachable {
            host: "web1".into(),
            message: "refused".into(),
        });
        assert_eq!(unreachable.exit_code(), 3);
    }
}
