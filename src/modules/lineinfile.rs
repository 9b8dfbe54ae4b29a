//! Lineinfile module - Ensure a particular line is in a file
//!
//! With `regexp`, the last matching line is replaced by `line` (or, for
//! `state: absent`, every matching line is removed). Without it, lines are
//! matched literally.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;

use super::{
    observe_path, Change, Diff, Module, ModuleContext, ModuleError, ModuleParams, ModuleResult,
    Observed, ParamExt, Plan,
};

/// Module for managing single lines in text files
pub struct LineinfileModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    Present,
    Absent,
}

struct LineArgs {
    path: PathBuf,
    line: Option<String>,
    regexp: Option<Regex>,
    state: LineState,
    create: bool,
    mode: Option<u32>,
}

impl LineinfileModule {
    fn args(params: &ModuleParams) -> ModuleResult<LineArgs> {
        let path = params
            .get_path("path")?
            .or(params.get_path("dest")?)
            .ok_or_else(|| ModuleError::MissingParameter("path".to_string()))?;

        let state = match params.get_string("state")?.as_deref() {
            None | Some("present") => LineState::Present,
            Some("absent") => LineState::Absent,
            Some(other) => {
                return Err(ModuleError::InvalidParameter(format!(
                    "Invalid state '{}'. Valid states: present, absent",
                    other
                )))
            }
        };

        let regexp = params
            .get_string("regexp")?
            .map(|r| {
                Regex::new(&r).map_err(|e| {
                    ModuleError::InvalidParameter(format!("Invalid regexp '{}': {}", r, e))
                })
            })
            .transpose()?;

        let line = params.get_string("line")?;
        if line.is_none() && (state == LineState::Present || regexp.is_none()) {
            return Err(ModuleError::MissingParameter("line".to_string()));
        }
        if line.as_deref().is_some_and(|l| l.contains('\n')) {
            return Err(ModuleError::InvalidParameter(
                "line must not contain a newline".to_string(),
            ));
        }

        Ok(LineArgs {
            path,
            line,
            regexp,
            state,
            create: params.get_bool_or("create", false),
            mode: params.get_mode("mode")?,
        })
    }

    fn matches(args: &LineArgs, candidate: &str) -> bool {
        match (&args.regexp, &args.line) {
            (Some(re), _) => re.is_match(candidate),
            (None, Some(line)) => candidate == line,
            (None, None) => false,
        }
    }

    /// Compute the new file body, `None` when nothing changes
    fn edit(args: &LineArgs, before: &str) -> Option<String> {
        let mut lines: Vec<&str> = before.lines().collect();

        match args.state {
            LineState::Present => {
                let line = args.line.as_deref()?;
                let last_match = lines.iter().rposition(|l| Self::matches(args, l));
                match last_match {
                    Some(idx) if lines[idx] == line => return None,
                    Some(idx) => lines[idx] = line,
                    None if args.regexp.is_some() && lines.iter().any(|l| *l == line) => {
                        return None
                    }
                    None => lines.push(line),
                }
            }
            LineState::Absent => {
                let len = lines.len();
                lines.retain(|l| !Self::matches(args, l));
                if lines.len() == len {
                    return None;
                }
            }
        }

        let mut after = lines.join("\n");
        if !after.is_empty() {
            after.push('\n');
        }
        Some(after)
    }
}

#[async_trait]
impl Module for LineinfileModule {
    fn name(&self) -> &'static str {
        "lineinfile"
    }

    fn description(&self) -> &'static str {
        "Ensure a line is present in or absent from a text file"
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        Self::args(params).map(|_| ())
    }

    async fn observe(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<Observed> {
        let args = Self::args(params)?;
        let state = observe_path(context.connection.as_ref(), &args.path, true).await?;
        Ok(Observed::new().with_path(args.path, state))
    }

    fn plan(
        &self,
        params: &ModuleParams,
        observed: &Observed,
        _context: &ModuleContext,
    ) -> ModuleResult<Plan> {
        let args = Self::args(params)?;
        let current = observed.path(&args.path);

        if current.is_dir() {
            return Err(ModuleError::ExecutionFailed(format!(
                "{} is a directory",
                args.path.display()
            )));
        }
        if !current.exists() {
            if args.state == LineState::Absent {
                return Ok(Plan::noop(format!("{} does not exist", args.path.display())));
            }
            if !args.create {
                return Err(ModuleError::ExecutionFailed(format!(
                    "Destination {} does not exist",
                    args.path.display()
                )));
            }
        }

        let before = current.content.clone().unwrap_or_default();
        match Self::edit(&args, &before) {
            None => Ok(Plan::noop(format!("{} already as desired", args.path.display()))),
            Some(after) => {
                let msg = match args.state {
                    LineState::Present => "line added",
                    LineState::Absent => "line removed",
                };
                Ok(Plan::change(
                    msg,
                    Change::WriteFile {
                        path: args.path.clone(),
                        content: after.clone(),
                        mode: args.mode,
                    },
                )
                .with_diff(Diff::text(&args.path, &before, &after)))
            }
        }
    }
}
