//! Change applier
//!
//! Runs a single task on a single host: resolve the module, observe the
//! target, plan, then apply (or, in check mode, only predict). Every failure
//! is turned into a [`Diagnostic`] that says whether the target was left
//! untouched or may have been partially changed.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use crate::modules::{ModuleContext, ModuleError, ModuleOutput, ModuleRegistry};
use crate::playbook::Task;
use crate::report::{Diagnostic, ExecutionResult, TargetState, TaskStatus};

/// Outcome of applying one task once
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub status: TaskStatus,
    pub msg: String,
    pub output: Option<ModuleOutput>,
    pub diagnostic: Option<Diagnostic>,
    pub predicted: bool,
    pub duration_ms: u64,
}

impl ApplyOutcome {
    fn success(output: ModuleOutput, predicted: bool) -> Self {
        Self {
            status: if output.changed {
                TaskStatus::Changed
            } else {
                TaskStatus::Ok
            },
            msg: output.msg.clone(),
            output: Some(output),
            diagnostic: None,
            predicted,
            duration_ms: 0,
        }
    }

    fn failure(error: ModuleError, target_state: TargetState) -> Self {
        if error.is_unreachable() {
            return Self {
                status: TaskStatus::Unreachable,
                msg: error.to_string(),
                output: None,
                diagnostic: Some(Diagnostic::new(error.to_string(), target_state)),
                predicted: false,
                duration_ms: 0,
            };
        }

        let diagnostic = match error {
            ModuleError::CommandFailed {
                code,
                stdout,
                stderr,
            } => Diagnostic::new(format!("non-zero return code {}", code), target_state)
                .with_command_output(stdout, stderr, code),
            other => Diagnostic::new(other.to_string(), target_state),
        };
        Self {
            status: TaskStatus::Failed,
            msg: diagnostic.message.clone(),
            output: None,
            diagnostic: Some(diagnostic),
            predicted: false,
            duration_ms: 0,
        }
    }

    pub fn is_changed(&self) -> bool {
        self.status == TaskStatus::Changed
    }

    /// Turn the outcome into a report entry for `task`
    pub fn into_result(self, task: &Task, attempts: u32) -> ExecutionResult {
        let mut result = ExecutionResult::new(&task.name, &task.module, self.status, self.msg);
        result.attempts = attempts;
        result.predicted = self.predicted;
        result.duration_ms = self.duration_ms;
        result.diff = self.output.as_ref().and_then(|o| o.diff.clone());
        result.output = self.output;
        result.diagnostic = self.diagnostic;
        result
    }
}

/// Applies tasks through the module registry
#[derive(Clone)]
pub struct Applier {
    registry: Arc<ModuleRegistry>,
}

impl Applier {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Apply `task` once. Never returns an error: failures become outcomes.
    pub async fn apply(&self, task: &Task, context: &ModuleContext) -> ApplyOutcome {
        let started = Instant::now();
        let mut outcome = self.apply_inner(task, context).await;
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        trace!(
            host = %context.host,
            task = %task.name,
            status = %outcome.status,
            duration_ms = outcome.duration_ms,
            "Task applied"
        );
        outcome
    }

    async fn apply_inner(&self, task: &Task, context: &ModuleContext) -> ApplyOutcome {
        let module = match self.registry.validate(&task.module, &task.args) {
            Ok(module) => module,
            Err(e) => return ApplyOutcome::failure(e, TargetState::Unchanged),
        };

        let observed = match module.observe(&task.args, context).await {
            Ok(observed) => observed,
            Err(e) => return ApplyOutcome::failure(e, TargetState::Unchanged),
        };

        let plan = match module.plan(&task.args, &observed, context) {
            Ok(plan) => plan,
            Err(e) => return ApplyOutcome::failure(e, TargetState::Unchanged),
        };

        if plan.is_noop() {
            debug!(host = %context.host, task = %task.name, "Already in desired state");
            return ApplyOutcome::success(ModuleOutput::from_plan(&plan, context.diff_mode), false);
        }

        if context.check_mode {
            debug!(
                host = %context.host,
                task = %task.name,
                changes = plan.changes.len(),
                "Check mode: change predicted, not applied"
            );
            return ApplyOutcome::success(ModuleOutput::from_plan(&plan, context.diff_mode), true);
        }

        match module.apply(&plan, context).await {
            Ok(output) => ApplyOutcome::success(output, false),
            Err(e) => ApplyOutcome::failure(e, TargetState::Unknown),
        }
    }
}
