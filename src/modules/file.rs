//! File module - Manage files and directories
//!
//! Supported states:
//! - `file`: the path must already be a regular file; only its mode is managed
//! - `directory`: create the directory (and parents) if missing
//! - `absent`: remove the path, recursively for directories
//! - `touch`: create an empty file if missing

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::{
    observe_path, Change, Diff, Module, ModuleContext, ModuleError, ModuleParams, ModuleResult,
    Observed, ParamExt, PathState, Plan,
};

/// Desired state of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    File,
    Directory,
    Absent,
    Touch,
}

impl FromStr for FileState {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(FileState::File),
            "directory" => Ok(FileState::Directory),
            "absent" => Ok(FileState::Absent),
            "touch" => Ok(FileState::Touch),
            other => Err(ModuleError::InvalidParameter(format!(
                "Invalid state '{}'. Valid states: file, directory, absent, touch",
                other
            ))),
        }
    }
}

fn describe(state: &PathState) -> &'static str {
    if state.is_dir() {
        "directory"
    } else if state.exists() {
        "file"
    } else {
        "absent"
    }
}

/// Module for managing files and directories
pub struct FileModule;

impl FileModule {
    fn args(params: &ModuleParams) -> ModuleResult<(PathBuf, FileState, Option<u32>)> {
        let path = params
            .get_path("path")?
            .or(params.get_path("dest")?)
            .ok_or_else(|| ModuleError::MissingParameter("path".to_string()))?;
        let state = params
            .get_string("state")?
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(FileState::File);
        Ok((path, state, params.get_mode("mode")?))
    }

    fn mode_plan(path: &Path, current: &PathState, mode: Option<u32>) -> Option<Plan> {
        let mode = mode?;
        if current.mode() == Some(mode) {
            return None;
        }
        Some(
            Plan::change(
                format!("mode of {} set to {:04o}", path.display(), mode),
                Change::SetMode {
                    path: path.to_path_buf(),
                    mode,
                },
            )
            .with_diff(Diff::new(
                format!("mode: {:04o}", current.mode().unwrap_or_default()),
                format!("mode: {:04o}", mode),
            )),
        )
    }
}

#[async_trait]
impl Module for FileModule {
    fn name(&self) -> &'static str {
        "file"
    }

    fn description(&self) -> &'static str {
        "Manage the existence and mode of files and directories"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        Self::args(params).map(|_| ())
    }

    async fn observe(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<Observed> {
        let (path, _, _) = Self::args(params)?;
        let state = observe_path(context.connection.as_ref(), &path, false).await?;
        Ok(Observed::new().with_path(path, state))
    }

    fn plan(
        &self,
        params: &ModuleParams,
        observed: &Observed,
        _context: &ModuleContext,
    ) -> ModuleResult<Plan> {
        let (path, state, mode) = Self::args(params)?;
        let current = observed.path(&path);
        let unchanged = || Plan::noop(format!("{} is already {}", path.display(), describe(&current)));

        match state {
            FileState::Absent => {
                if !current.exists() {
                    return Ok(unchanged());
                }
                Ok(Plan::change(
                    format!("removed {}", path.display()),
                    Change::Remove { path: path.clone() },
                )
                .with_diff(Diff::new(describe(&current), "absent")))
            }
            FileState::Directory => {
                if current.exists() && !current.is_dir() {
                    return Err(ModuleError::ExecutionFailed(format!(
                        "{} exists and is not a directory",
                        path.display()
                    )));
                }
                if !current.exists() {
                    return Ok(Plan::change(
                        format!("created directory {}", path.display()),
                        Change::CreateDir {
                            path: path.clone(),
                            mode,
                        },
                    )
                    .with_diff(Diff::new("absent", "directory")));
                }
                Ok(Self::mode_plan(&path, &current, mode).unwrap_or_else(unchanged))
            }
            FileState::File => {
                if !current.exists() {
                    return Err(ModuleError::ExecutionFailed(format!(
                        "file {} does not exist, use state=touch to create it",
                        path.display()
                    )));
                }
                if current.is_dir() {
                    return Err(ModuleError::ExecutionFailed(format!(
                        "{} is a directory",
                        path.display()
                    )));
                }
                Ok(Self::mode_plan(&path, &current, mode).unwrap_or_else(unchanged))
            }
            FileState::Touch => {
                if !current.exists() {
                    return Ok(Plan::change(
                        format!("touched {}", path.display()),
                        Change::WriteFile {
                            path: path.clone(),
                            content: String::new(),
                            mode,
                        },
                    )
                    .with_diff(Diff::new("absent", "file")));
                }
                Ok(Self::mode_plan(&path, &current, mode).unwrap_or_else(unchanged))
            }
        }
    }
}
