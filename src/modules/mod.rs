//! Module system for converge
//!
//! A module is the unit of work a task names. Every module follows the same
//! three steps:
//!
//! 1. [`Module::observe`] reads the part of the target the module manages.
//! 2. [`Module::plan`] compares the desired parameters with that observation
//!    and decides which [`Change`]s are needed. This step is pure.
//! 3. [`Module::apply`] carries the plan out through the host connection.
//!
//! Check mode stops after step 2, which is how every module gets a dry-run
//! and diff path for free.

pub mod command;
pub mod copy;
pub mod debug;
pub mod file;
pub mod lineinfile;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::connection::{
    CommandResult, Connection, ConnectionError, ExecuteOptions, FileStat, TransferOptions,
};
use crate::vars::HostVars;

/// Errors that can occur during module execution
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command failed with exit code {code}")]
    CommandFailed {
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl ModuleError {
    /// Whether the error means the host itself could not be reached
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ModuleError::Connection(e) if e.is_unreachable())
    }

    /// Parameter problems are detected before anything runs
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            ModuleError::NotFound(_)
                | ModuleError::InvalidParameter(_)
                | ModuleError::MissingParameter(_)
        )
    }
}

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Parameters passed to a module
pub type ModuleParams = IndexMap<String, serde_json::Value>;

/// Represents a difference between current and desired state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// State before the change
    pub before: String,
    /// State after the change
    pub after: String,
    /// Unified diff for text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Diff {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
            details: None,
        }
    }

    /// Build a diff of two text bodies, rendered as a unified diff
    pub fn text(path: &Path, before: &str, after: &str) -> Self {
        let label = path.display().to_string();
        let details = similar::TextDiff::from_lines(before, after)
            .unified_diff()
            .context_radius(3)
            .header(&format!("before: {}", label), &format!("after: {}", label))
            .to_string();
        Self {
            before: before.to_string(),
            after: after.to_string(),
            details: Some(details),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Observed state of one path on the target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathState {
    pub stat: Option<FileStat>,
    /// Text content, read only when the module asked for it and the path is a file
    pub content: Option<String>,
}

impl PathState {
    pub fn exists(&self) -> bool {
        self.stat.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.stat.as_ref().is_some_and(|s| s.is_file)
    }

    pub fn is_dir(&self) -> bool {
        self.stat.as_ref().is_some_and(|s| s.is_dir)
    }

    pub fn mode(&self) -> Option<u32> {
        self.stat.as_ref().map(|s| s.mode)
    }
}

/// Everything a module observed before planning
#[derive(Debug, Clone, Default)]
pub struct Observed {
    paths: IndexMap<PathBuf, PathState>,
}

impl Observed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>, state: PathState) -> Self {
        self.paths.insert(path.into(), state);
        self
    }

    /// Observed state of `path`; an unobserved path reads as absent
    pub fn path(&self, path: &Path) -> PathState {
        self.paths.get(path).cloned().unwrap_or_default()
    }
}

/// A single mutation a module wants performed
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    WriteFile {
        path: PathBuf,
        content: String,
        mode: Option<u32>,
    },
    SetMode {
        path: PathBuf,
        mode: u32,
    },
    CreateDir {
        path: PathBuf,
        mode: Option<u32>,
    },
    Remove {
        path: PathBuf,
    },
    Run {
        command: String,
        cwd: Option<String>,
    },
}

impl Change {
    /// Carry the change out. Commands hand back their result.
    pub async fn apply(&self, conn: &dyn Connection) -> ModuleResult<Option<CommandResult>> {
        match self {
            Change::WriteFile {
                path,
                content,
                mode,
            } => {
                let mut options = TransferOptions::new().with_create_dirs();
                options.mode = *mode;
                conn.upload_content(content.as_bytes(), path, Some(options))
                    .await?;
            }
            Change::SetMode { path, mode } => conn.set_mode(path, *mode).await?,
            Change::CreateDir { path, mode } => conn.create_dir(path, *mode).await?,
            Change::Remove { path } => conn.remove(path).await?,
            Change::Run { command, cwd } => {
                let mut options = ExecuteOptions::new();
                options.cwd = cwd.clone();
                let result = conn.execute(command, Some(options)).await?;
                if !result.success {
                    return Err(ModuleError::CommandFailed {
                        code: result.exit_code,
                        stdout: result.stdout,
                        stderr: result.stderr,
                    });
                }
                return Ok(Some(result));
            }
        }
        Ok(None)
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::WriteFile { path, .. } => write!(f, "write {}", path.display()),
            Change::SetMode { path, mode } => write!(f, "chmod {:04o} {}", mode, path.display()),
            Change::CreateDir { path, .. } => write!(f, "mkdir {}", path.display()),
            Change::Remove { path } => write!(f, "remove {}", path.display()),
            Change::Run { command, .. } => write!(f, "run `{}`", command),
        }
    }
}

/// The outcome of comparing desired and observed state
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub changes: Vec<Change>,
    pub msg: String,
    pub diff: Option<Diff>,
    pub data: IndexMap<String, serde_json::Value>,
}

impl Plan {
    /// Nothing to do: the target already matches
    pub fn noop(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            ..Default::default()
        }
    }

    pub fn change(msg: impl Into<String>, change: Change) -> Self {
        Self {
            changes: vec![change],
            msg: msg.into(),
            ..Default::default()
        }
    }

    pub fn then(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_diff(mut self, diff: Diff) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Result of a module execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleOutput {
    /// Whether the module changed anything
    pub changed: bool,
    /// Human-readable message about what happened
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
}

impl ModuleOutput {
    /// Create a new successful output with no changes
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            ..Default::default()
        }
    }

    /// Create a new successful output with changes
    pub fn changed(msg: impl Into<String>) -> Self {
        Self {
            changed: true,
            msg: msg.into(),
            ..Default::default()
        }
    }

    /// Output describing a plan without running it
    pub fn from_plan(plan: &Plan, diff_mode: bool) -> Self {
        Self {
            changed: !plan.is_noop(),
            msg: plan.msg.clone(),
            diff: if diff_mode { plan.diff.clone() } else { None },
            data: plan.data.clone(),
            ..Default::default()
        }
    }

    /// Add a diff to the output
    pub fn with_diff(mut self, diff: Diff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Add stdout/stderr/rc for command outputs
    pub fn with_command_output(mut self, result: &CommandResult) -> Self {
        self.stdout = Some(result.stdout.clone());
        self.stderr = Some(result.stderr.clone());
        self.rc = Some(result.exit_code);
        self
    }
}

/// Context for module execution
#[derive(Clone)]
pub struct ModuleContext {
    /// Inventory name of the target
    pub host: String,
    /// Whether to run in check mode (dry run)
    pub check_mode: bool,
    /// Whether to attach diffs
    pub diff_mode: bool,
    /// Variables resolved for the host
    pub vars: HostVars,
    /// Connection to the target
    pub connection: Arc<dyn Connection>,
}

impl ModuleContext {
    pub fn new(host: impl Into<String>, connection: Arc<dyn Connection>) -> Self {
        Self {
            host: host.into(),
            check_mode: false,
            diff_mode: false,
            vars: HostVars::new(),
            connection,
        }
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    pub fn with_diff_mode(mut self, diff_mode: bool) -> Self {
        self.diff_mode = diff_mode;
        self
    }

    pub fn with_vars(mut self, vars: HostVars) -> Self {
        self.vars = vars;
        self
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("host", &self.host)
            .field("check_mode", &self.check_mode)
            .field("diff_mode", &self.diff_mode)
            .field("vars", &self.vars.len())
            .field("connection", &self.connection.identifier())
            .finish()
    }
}

/// Trait that all modules must implement
#[async_trait]
pub trait Module: Send + Sync {
    /// Name used in task declarations
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Parameters that must be present
    fn required_params(&self) -> &[&'static str] {
        &[]
    }

    /// Static parameter checks, run before any host is touched
    fn validate_params(&self, _params: &ModuleParams) -> ModuleResult<()> {
        Ok(())
    }

    /// Read the current state of whatever the module manages
    async fn observe(&self, params: &ModuleParams, context: &ModuleContext)
        -> ModuleResult<Observed>;

    /// Decide what must change. Must not touch the target.
    fn plan(
        &self,
        params: &ModuleParams,
        observed: &Observed,
        context: &ModuleContext,
    ) -> ModuleResult<Plan>;

    /// Perform the planned changes
    async fn apply(&self, plan: &Plan, context: &ModuleContext) -> ModuleResult<ModuleOutput> {
        let mut last_command = None;
        for change in &plan.changes {
            tracing::debug!(host = %context.host, module = self.name(), change = %change, "Applying change");
            if let Some(result) = change.apply(context.connection.as_ref()).await? {
                last_command = Some(result);
            }
        }

        let mut output = ModuleOutput::from_plan(plan, context.diff_mode);
        if let Some(result) = &last_command {
            output = output.with_command_output(result);
        }
        Ok(output)
    }
}

/// Read the state of `path`, including its text when `with_content` is set
pub async fn observe_path(
    conn: &dyn Connection,
    path: &Path,
    with_content: bool,
) -> ModuleResult<PathState> {
    let stat = conn.stat(path).await?;
    let content = match &stat {
        Some(s) if with_content && s.is_file => {
            let bytes = conn.download_content(path).await?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => None,
    };
    Ok(PathState { stat, content })
}

/// Typed accessors for module parameters
pub trait ParamExt {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>>;
    fn get_string_required(&self, key: &str) -> ModuleResult<String>;
    fn get_bool(&self, key: &str) -> ModuleResult<Option<bool>>;
    fn get_bool_or(&self, key: &str, default: bool) -> bool;
    fn get_path(&self, key: &str) -> ModuleResult<Option<PathBuf>>;
    fn get_mode(&self, key: &str) -> ModuleResult<Option<u32>>;
}

impl ParamExt for ModuleParams {
    fn get_string(&self, key: &str) -> ModuleResult<Option<String>> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
            Some(serde_json::Value::Array(_)) | Some(serde_json::Value::Object(_)) => Err(
                ModuleError::InvalidParameter(format!("{} must be a string", key)),
            ),
            Some(v) => Ok(Some(v.to_string())),
        }
    }

    fn get_string_required(&self, key: &str) -> ModuleResult<String> {
        self.get_string(key)?
            .ok_or_else(|| ModuleError::MissingParameter(key.to_string()))
    }

    fn get_bool(&self, key: &str) -> ModuleResult<Option<bool>> {
        match self.get(key) {
            Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
            Some(serde_json::Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(Some(true)),
                "false" | "no" | "0" | "off" => Ok(Some(false)),
                _ => Err(ModuleError::InvalidParameter(format!(
                    "{} must be a boolean",
                    key
                ))),
            },
            Some(_) => Err(ModuleError::InvalidParameter(format!(
                "{} must be a boolean",
                key
            ))),
            None => Ok(None),
        }
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).ok().flatten().unwrap_or(default)
    }

    fn get_path(&self, key: &str) -> ModuleResult<Option<PathBuf>> {
        match self.get_string(key)? {
            Some(s) if s.trim().is_empty() => Err(ModuleError::InvalidParameter(format!(
                "{} must not be empty",
                key
            ))),
            Some(s) => Ok(Some(PathBuf::from(s))),
            None => Ok(None),
        }
    }

    /// File modes are octal: `"0644"`, `"644"` and the YAML integer `644`
    /// all mean `rw-r--r--`.
    fn get_mode(&self, key: &str) -> ModuleResult<Option<u32>> {
        let raw = match self.get(key) {
            None | Some(serde_json::Value::Null) => return Ok(None),
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(_) => {
                return Err(ModuleError::InvalidParameter(format!(
                    "{} must be an octal mode",
                    key
                )))
            }
        };
        let digits = raw.strip_prefix("0o").unwrap_or(&raw);
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|m| *m <= 0o7777)
            .map(Some)
            .ok_or_else(|| {
                ModuleError::InvalidParameter(format!("{} must be an octal mode, got '{}'", key, raw))
            })
    }
}

/// Registry for looking up modules by name
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Create a registry with all built-in modules
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(command::CommandModule));
        registry.register(Arc::new(copy::CopyModule));
        registry.register(Arc::new(debug::DebugModule));
        registry.register(Arc::new(file::FileModule));
        registry.register(Arc::new(lineinfile::LineinfileModule));
        registry
    }

    /// Register a module, replacing any module with the same name
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Get a module by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }

    /// Check if a module exists
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Get all module names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a module and check its parameters
    pub fn validate(&self, name: &str, params: &ModuleParams) -> ModuleResult<Arc<dyn Module>> {
        let module = self
            .get(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

        for param in module.required_params() {
            if !params.contains_key(*param) {
                return Err(ModuleError::MissingParameter((*param).to_string()));
            }
        }
        module.validate_params(params)?;
        Ok(module)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, serde_json::Value)]) -> ModuleParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_registry_builtins() {
        let registry = ModuleRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["command", "copy", "debug", "file", "lineinfile"]
        );
        assert!(registry.contains("copy"));
        assert!(registry.get("apt").is_none());
    }

    #[test]
    fn test_registry_validate() {
        let registry = ModuleRegistry::with_builtins();

        let err = registry.validate("nope", &ModuleParams::new()).err().unwrap();
        assert!(matches!(err, ModuleError::NotFound(_)));

        let err = registry
            .validate("copy", &params(&[("content", json!("x"))]))
            .err()
            .unwrap();
        assert!(matches!(err, ModuleError::MissingParameter(ref p) if p == "dest"));

        assert!(registry
            .validate("copy", &params(&[("dest", json!("/a")), ("content", json!("x"))]))
            .is_ok());
    }

    #[test]
    fn test_param_ext() {
        let p = params(&[
            ("name", json!("web")),
            ("port", json!(80)),
            ("enabled", json!("yes")),
            ("bad", json!("maybe")),
            ("list", json!(["a"])),
        ]);

        assert_eq!(p.get_string("name").unwrap().as_deref(), Some("web"));
        assert_eq!(p.get_string("port").unwrap().as_deref(), Some("80"));
        assert!(p.get_string("list").is_err());
        assert!(p.get_string_required("missing").is_err());
        assert_eq!(p.get_bool("enabled").unwrap(), Some(true));
        assert!(p.get_bool("bad").is_err());
        assert!(p.get_bool_or("bad", true));
    }

    #[test]
    fn test_mode_parsing() {
        let p = params(&[
            ("a", json!("0644")),
            ("b", json!(755)),
            ("c", json!("0o600")),
            ("d", json!("999")),
        ]);
        assert_eq!(p.get_mode("a").unwrap(), Some(0o644));
        assert_eq!(p.get_mode("b").unwrap(), Some(0o755));
        assert_eq!(p.get_mode("c").unwrap(), Some(0o600));
        assert!(p.get_mode("d").is_err());
        assert_eq!(p.get_mode("missing").unwrap(), None);
    }

    #[test]
    fn test_text_diff() {
        let diff = Diff::text(Path::new("/etc/motd"), "a\nb\n", "a\nc\n");
        let details = diff.details.unwrap();
        assert!(details.contains("-b"));
        assert!(details.contains("+c"));
        assert!(details.contains("before: /etc/motd"));
    }

    #[test]
    fn test_plan_helpers() {
        let plan = Plan::noop("already there");
        assert!(plan.is_noop());

        let plan = Plan::change(
            "create",
            Change::CreateDir {
                path: "/srv".into(),
                mode: None,
            },
        )
        .then(Change::SetMode {
            path: "/srv".into(),
            mode: 0o755,
        });
        assert_eq!(plan.changes.len(), 2);
        assert_eq!(plan.changes[1].to_string(), "chmod 0755 /srv");
        assert!(ModuleOutput::from_plan(&plan, false).changed);
    }

    #[test]
    fn test_observed_defaults_to_absent() {
        let observed = Observed::new();
        assert!(!observed.path(Path::new("/nope")).exists());
    }
}
