//! Copy module - Place content into a file on the target
//!
//! The file is rewritten only when its content differs, and its mode is
//! changed only when it differs, so a second run reports `ok`.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{
    observe_path, Change, Diff, Module, ModuleContext, ModuleError, ModuleParams, ModuleResult,
    Observed, ParamExt, Plan,
};

/// Module for copying content to a destination file
pub struct CopyModule;

struct CopyArgs {
    dest: PathBuf,
    content: String,
    mode: Option<u32>,
}

impl CopyModule {
    fn args(params: &ModuleParams) -> ModuleResult<CopyArgs> {
        let dest = params
            .get_path("dest")?
            .ok_or_else(|| ModuleError::MissingParameter("dest".to_string()))?;
        let content = params.get_string_required("content")?;
        Ok(CopyArgs {
            dest,
            content,
            mode: params.get_mode("mode")?,
        })
    }
}

#[async_trait]
impl Module for CopyModule {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn description(&self) -> &'static str {
        "Write literal content to a file"
    }

    fn required_params(&self) -> &[&'static str] {
        &["dest", "content"]
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
        let state = observe_path(context.connection.as_ref(), &args.dest, true).await?;
        Ok(Observed::new().with_path(args.dest, state))
    }

    fn plan(
        &self,
        params: &ModuleParams,
        observed: &Observed,
        _context: &ModuleContext,
    ) -> ModuleResult<Plan> {
        let args = Self::args(params)?;
        let current = observed.path(&args.dest);

        if current.is_dir() {
            return Err(ModuleError::InvalidParameter(format!(
                "dest {} is a directory",
                args.dest.display()
            )));
        }

        let before = current.content.clone().unwrap_or_default();
        if !current.exists() || before != args.content {
            let verb = if current.exists() { "updated" } else { "created" };
            return Ok(Plan::change(
                format!("{} {}", verb, args.dest.display()),
                Change::WriteFile {
                    path: args.dest.clone(),
                    content: args.content.clone(),
                    mode: args.mode,
                },
            )
            .with_diff(Diff::text(&args.dest, &before, &args.content)));
        }

        match args.mode {
            Some(mode) if current.mode() != Some(mode) => Ok(Plan::change(
                format!("mode of {} set to {:04o}", args.dest.display(), mode),
                Change::SetMode {
                    path: args.dest.clone(),
                    mode,
                },
            )
            .with_diff(Diff::new(
                format!("mode: {:04o}", current.mode().unwrap_or_default()),
                format!("mode: {:04o}", mode),
            ))),
            _ => Ok(Plan::noop(format!("{} is up to date", args.dest.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LocalConnection;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn params(dest: &str, content: &str) -> ModuleParams {
        let mut p = ModuleParams::new();
        p.insert("dest".into(), json!(dest));
        p.insert("content".into(), json!(content));
        p
    }

    async fn converge(p: &ModuleParams, ctx: &ModuleContext) -> bool {
        let observed = CopyModule.observe(p, ctx).await.unwrap();
        let plan = CopyModule.plan(p, &observed, ctx).unwrap();
        let changed = !plan.is_noop();
        if changed {
            CopyModule.apply(&plan, ctx).await.unwrap();
        }
        changed
    }

    #[tokio::test]
    async fn test_copy_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let ctx = ModuleContext::new("box", Arc::new(LocalConnection::rooted("box", temp.path())));
        let p = params("/etc/nginx/nginx.conf", "worker_processes 4;\n");

        assert!(converge(&p, &ctx).await);
        assert!(!converge(&p, &ctx).await);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("etc/nginx/nginx.conf")).unwrap(),
            "worker_processes 4;\n"
        );
    }

    #[tokio::test]
    async fn test_copy_detects_drift() {
        let temp = TempDir::new().unwrap();
        let ctx = ModuleContext::new("box", Arc::new(LocalConnection::rooted("box", temp.path())));
        let p = params("/motd", "hello\n");

        assert!(converge(&p, &ctx).await);
        std::fs::write(temp.path().join("motd"), "tampered\n").unwrap();

        let observed = CopyModule.observe(&p, &ctx).await.unwrap();
        let plan = CopyModule.plan(&p, &observed, &ctx).unwrap();
        assert!(plan.msg.starts_with("updated"));
        let diff = plan.diff.unwrap();
        assert_eq!(diff.before, "tampered\n");
        assert!(diff.details.unwrap().contains("+hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_mode_only_change() {
        let temp = TempDir::new().unwrap();
        let ctx = ModuleContext::new("box", Arc::new(LocalConnection::rooted("box", temp.path())));
        let mut p = params("/app.env", "A=1\n");
        p.insert("mode".into(), json!("0600"));
        assert!(converge(&p, &ctx).await);
        assert!(!converge(&p, &ctx).await);

        p.insert("mode".into(), json!("0640"));
        let observed = CopyModule.observe(&p, &ctx).await.unwrap();
        let plan = CopyModule.plan(&p, &observed, &ctx).unwrap();
        assert_eq!(
            plan.changes,
            vec![Change::SetMode {
                path: "/app.env".into(),
                mode: 0o640
            }]
        );
    }

    #[tokio::test]
    async fn test_copy_onto_directory_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("srv")).unwrap();
        let ctx = ModuleContext::new("box", Arc::new(LocalConnection::rooted("box", temp.path())));
        let p = params("/srv", "x");
        let observed = CopyModule.observe(&p, &ctx).await.unwrap();
        assert!(CopyModule.plan(&p, &observed, &ctx).is_err());
    }
}
