//! Command module - Execute commands on the target
//!
//! Commands cannot be inspected ahead of time, so a command always reports a
//! change when it runs. The `creates` and `removes` guards make it converge:
//! with `creates: /path` the command is skipped once the path exists, with
//! `removes: /path` it is skipped once the path is gone.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{
    observe_path, Change, Module, ModuleContext, ModuleError, ModuleParams, ModuleResult,
    Observed, ParamExt, Plan,
};

/// Module for executing commands
pub struct CommandModule;

impl CommandModule {
    fn command_line(params: &ModuleParams) -> ModuleResult<String> {
        let cmd = match params.get_string("cmd")? {
            Some(cmd) => cmd,
            None => params.get_string("_raw_params")?.ok_or_else(|| {
                ModuleError::MissingParameter("cmd (or a free-form command)".to_string())
            })?,
        };
        if cmd.trim().is_empty() {
            return Err(ModuleError::InvalidParameter(
                "command must not be empty".to_string(),
            ));
        }
        Ok(cmd)
    }

    fn guards(params: &ModuleParams) -> ModuleResult<(Option<PathBuf>, Option<PathBuf>)> {
        Ok((params.get_path("creates")?, params.get_path("removes")?))
    }
}

#[async_trait]
impl Module for CommandModule {
    fn name(&self) -> &'static str {
        "command"
    }

    fn description(&self) -> &'static str {
        "Execute a command through the host's shell"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        Self::command_line(params)?;
        Self::guards(params)?;
        params.get_string("chdir")?;
        Ok(())
    }

    async fn observe(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<Observed> {
        let conn = context.connection.as_ref();
        let mut observed = Observed::new();
        let (creates, removes) = Self::guards(params)?;
        for path in creates.into_iter().chain(removes) {
            let state = observe_path(conn, &path, false).await?;
            observed = observed.with_path(path, state);
        }
        Ok(observed)
    }

    fn plan(
        &self,
        params: &ModuleParams,
        observed: &Observed,
        _context: &ModuleContext,
    ) -> ModuleResult<Plan> {
        let command = Self::command_line(params)?;
        let (creates, removes) = Self::guards(params)?;

        if let Some(path) = creates {
            if observed.path(&path).exists() {
                return Ok(Plan::noop(format!(
                    "skipped, since {} exists",
                    path.display()
                )));
            }
        }
        if let Some(path) = removes {
            if !observed.path(&path).exists() {
                return Ok(Plan::noop(format!(
                    "skipped, since {} does not exist",
                    path.display()
                )));
            }
        }

        Ok(Plan::change(
            format!("ran `{}`", command),
            Change::Run {
                command: command.clone(),
                cwd: params.get_string("chdir")?,
            },
        )
        .with_data("cmd", serde_json::Value::String(command)))
    }
}
