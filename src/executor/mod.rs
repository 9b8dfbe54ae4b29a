//! Core execution engine for converge
//!
//! The engine runs in two phases:
//!
//! 1. Every play is expanded into per-host task lists by the
//!    [`GraphBuilder`]. Any structural problem aborts the run here, before a
//!    host is touched.
//! 2. Plays run one after another. Within a play each host gets its own
//!    worker; a semaphore caps how many run at once (the fork pool). A
//!    worker runs its host's tasks strictly in order, then the host's
//!    notified handlers.
//!
//! Per-host state moves `pending -> running -> {completed, failed,
//! unreachable}`. A failed task stops its host (unless `ignore_errors`); an
//! unreachable host has every remaining task recorded as unreachable (unless
//! `ignore_unreachable`). Other hosts are never affected. Hosts that failed
//! or became unreachable are left out of later plays.
//!
//! Cancellation is cooperative: the token is checked between tasks, so a
//! task that has started is always allowed to finish.

pub mod applier;
pub mod condition;
pub mod graph;
pub mod step;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use applier::{Applier, ApplyOutcome};
pub use condition::{Condition, ConditionError};
pub use graph::{Disposition, GraphBuilder, HostPlan, PlannedTask, PlayGraph};
pub use step::{AutoApprove, PromptGate, StepAnswer, StepControl, StepGate};

use crate::callback::{ExecutionCallback, NullCallback};
use crate::connection::{Connection, ConnectionFactory, LocalConnectionFactory};
use crate::handlers::HandlerDispatcher;
use crate::inventory::{HostSelector, Inventory, InventoryError};
use crate::modules::{ModuleContext, ModuleError, ModuleRegistry};
use crate::playbook::{Play, Playbook, Task};
use crate::report::{
    Diagnostic, ExecutionResult, HostRecorder, HostState, PlayReport, ReportError, ResultLog,
    RunReport, TargetState, TaskStatus,
};
use crate::tags::TagFilter;

/// Errors that can occur during execution
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("play '{play}', task '{task}', host '{host}': {source}")]
    Condition {
        play: String,
        task: String,
        host: String,
        source: ConditionError,
    },

    #[error("play '{play}', task '{task}': {source}")]
    InvalidTask {
        play: String,
        task: String,
        source: ModuleError,
    },

    #[error("--start-at-task: no task named '{0}'")]
    UnknownStartTask(String),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("worker for host '{host}' failed: {message}")]
    Worker { host: String, message: String },
}

impl ExecutorError {
    /// Errors detected while expanding plays, before any host is touched
    pub fn is_structural(&self) -> bool {
        match self {
            ExecutorError::Inventory(e) => e.is_structural(),
            ExecutorError::Condition { .. }
            | ExecutorError::InvalidTask { .. }
            | ExecutorError::UnknownStartTask(_) => true,
            ExecutorError::Report(_) | ExecutorError::Worker { .. } => false,
        }
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of hosts worked on at once
    pub forks: usize,
    /// Predict changes without applying them
    pub check_mode: bool,
    /// Attach before/after diffs to results
    pub diff_mode: bool,
    /// Ask before every task
    pub step: bool,
    /// Pause between retries when a task sets `retries` but no `delay`
    pub default_retry_delay: Duration,
    /// Variables given on the command line, highest precedence
    pub extra_vars: IndexMap<String, JsonValue>,
    /// Further restrict every play's host selection
    pub limit: Option<HostSelector>,
    pub tag_filter: TagFilter,
    pub start_at_task: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            forks: 5,
            check_mode: false,
            diff_mode: false,
            step: false,
            default_retry_delay: Duration::from_secs(1),
            extra_vars: IndexMap::new(),
            limit: None,
            tag_filter: TagFilter::new(),
            start_at_task: None,
        }
    }
}

/// Runs playbooks against an inventory
pub struct Executor {
    config: ExecutorConfig,
    inventory: Arc<Inventory>,
    applier: Applier,
    connections: Arc<dyn ConnectionFactory>,
    callback: Arc<dyn ExecutionCallback>,
    step_gate: Arc<dyn StepGate>,
    cancel: CancellationToken,
}

impl Executor {
    /// Create an executor with the built-in modules and local connections
    pub fn new(inventory: Arc<Inventory>, config: ExecutorConfig) -> Self {
        Self {
            config,
            inventory,
            applier: Applier::new(Arc::new(ModuleRegistry::with_builtins())),
            connections: Arc::new(LocalConnectionFactory::new()),
            callback: Arc::new(NullCallback),
            step_gate: Arc::new(AutoApprove),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ModuleRegistry>) -> Self {
        self.applier = Applier::new(registry);
        self
    }

    pub fn with_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connections = factory;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ExecutionCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_step_gate(mut self, gate: Arc<dyn StepGate>) -> Self {
        self.step_gate = gate;
        self
    }

    /// Use an externally owned stop signal
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Graph builder configured from this executor
    pub fn graph_builder(&self) -> GraphBuilder<'_> {
        GraphBuilder::new(&self.inventory)
            .with_registry(self.applier.registry())
            .with_tag_filter(self.config.tag_filter.clone())
            .with_limit(self.config.limit.clone())
            .with_extra_vars(self.config.extra_vars.clone())
            .with_start_at_task(self.config.start_at_task.clone())
    }

    /// Expand every play without running anything
    pub fn plan(&self, playbook: &Playbook) -> ExecutorResult<Vec<PlayGraph>> {
        self.graph_builder().build(playbook)
    }

    /// Expand and run a playbook
    #[instrument(skip_all, fields(plays = playbook.plays.len()))]
    pub async fn run(&self, playbook: &Playbook) -> ExecutorResult<RunReport> {
        let graphs = self.plan(playbook)?;
        self.run_graphs(graphs).await
    }

    /// Run already expanded plays
    pub async fn run_graphs(&self, graphs: Vec<PlayGraph>) -> ExecutorResult<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::new(self.config.check_mode);
        let step = Arc::new(StepControl::new(
            Arc::clone(&self.step_gate),
            self.config.step,
        ));
        let mut failed_out: HashSet<String> = HashSet::new();

        for graph in graphs {
            if self.cancel.is_cancelled() {
                break;
            }
            let play_report = self.run_play(graph, &failed_out, &step).await?;
            for (host, state) in &play_report.host_states {
                if matches!(state, HostState::Failed | HostState::Unreachable) {
                    failed_out.insert(host.clone());
                }
            }
            report.plays.push(play_report);
        }

        report.interrupted = self.cancel.is_cancelled();
        report.duration_ms = started.elapsed().as_millis() as u64;
        if report.interrupted {
            warn!("Run interrupted, remaining tasks were not started");
        }
        info!(summary = %report.summary(), "Run finished");
        self.callback.on_run_end(&report).await;
        Ok(report)
    }

    #[instrument(skip_all, fields(play = %graph.name()))]
    async fn run_play(
        &self,
        graph: PlayGraph,
        failed_out: &HashSet<String>,
        step: &Arc<StepControl>,
    ) -> ExecutorResult<PlayReport> {
        let PlayGraph { play, hosts } = graph;
        let hosts: Vec<HostPlan> = hosts
            .into_iter()
            .filter(|plan| {
                let keep = !failed_out.contains(&plan.host);
                if !keep {
                    debug!(host = %plan.host, "Host failed in an earlier play, leaving it out");
                }
                keep
            })
            .collect();
        let host_names: Vec<String> = hosts.iter().map(|h| h.host.clone()).collect();

        info!(hosts = host_names.len(), "Starting play");
        self.callback.on_play_start(&play.name, &host_names).await;

        let log = ResultLog::new();
        let semaphore = Arc::new(Semaphore::new(self.config.forks.max(1)));
        let run = Arc::new(PlayRun {
            play: Arc::clone(&play),
            applier: self.applier.clone(),
            connections: Arc::clone(&self.connections),
            callback: Arc::clone(&self.callback),
            step: Arc::clone(step),
            cancel: self.cancel.clone(),
            check_mode: self.config.check_mode,
            diff_mode: self.config.diff_mode,
            default_retry_delay: self.config.default_retry_delay,
        });

        let handles: Vec<_> = hosts
            .into_iter()
            .map(|plan| {
                let recorder = log.recorder(plan.host.clone());
                let run = Arc::clone(&run);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        ExecutorError::Worker {
                            host: plan.host.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    run.run_host(plan, recorder).await
                })
            })
            .collect();

        let mut host_states = IndexMap::new();
        for (host, joined) in host_names.iter().zip(join_all(handles).await) {
            let state = joined.map_err(|e| ExecutorError::Worker {
                host: host.clone(),
                message: e.to_string(),
            })??;
            host_states.insert(host.clone(), state);
        }

        let report = PlayReport::from_log(play.name.clone(), host_names, host_states, &log);
        self.callback.on_play_end(&report).await;
        Ok(report)
    }
}

/// State shared by the host workers of one play
struct PlayRun {
    play: Arc<Play>,
    applier: Applier,
    connections: Arc<dyn ConnectionFactory>,
    callback: Arc<dyn ExecutionCallback>,
    step: Arc<StepControl>,
    cancel: CancellationToken,
    check_mode: bool,
    diff_mode: bool,
    default_retry_delay: Duration,
}

/// What happened to a host's run of one task
enum Step {
    Continue,
    Halt(HostState),
}

impl PlayRun {
    #[instrument(skip_all, fields(host = %plan.host))]
    async fn run_host(&self, plan: HostPlan, mut recorder: HostRecorder) -> ExecutorResult<HostState> {
        let mut state = HostState::Pending;
        if self.cancel.is_cancelled() {
            return Ok(state);
        }
        transition(&plan.host, &mut state, HostState::Running);

        let connection = match self.connections.connect(&plan.host, &plan.vars).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                warn!(error = %e, "Host unreachable");
                Err(e.to_string())
            }
        };

        let outcome = match &connection {
            Ok(conn) => self.run_connected(&plan, Arc::clone(conn), &mut recorder).await?,
            Err(message) => self.run_disconnected(&plan, message, &mut recorder).await?,
        };

        if let Ok(conn) = &connection {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Error closing connection");
            }
        }

        if let Some(next) = outcome {
            transition(&plan.host, &mut state, next);
        }
        info!(state = %state, results = recorder.recorded(), "Host finished");
        Ok(state)
    }

    /// The connection could not be opened: every task is unreachable.
    /// Returns `None` when halted by cancellation.
    async fn run_disconnected(
        &self,
        plan: &HostPlan,
        message: &str,
        recorder: &mut HostRecorder,
    ) -> ExecutorResult<Option<HostState>> {
        let mut tasks = plan.tasks.iter();
        while let Some(planned) = tasks.next() {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let task = &self.play.tasks[planned.task_index];
            if let Disposition::Skip { reason } = &planned.disposition {
                self.record(recorder, skipped(task, reason)).await?;
                continue;
            }

            let mut result = unreachable(task, message);
            if task.ignore_unreachable {
                result.ignored = true;
                self.record(recorder, result).await?;
                continue;
            }
            self.record(recorder, result).await?;
            for rest in tasks.by_ref() {
                let rest = &self.play.tasks[rest.task_index];
                self.record(recorder, unreachable(rest, message)).await?;
            }
            return Ok(Some(HostState::Unreachable));
        }
        Ok(Some(HostState::Completed))
    }

    async fn run_connected(
        &self,
        plan: &HostPlan,
        connection: Arc<dyn Connection>,
        recorder: &mut HostRecorder,
    ) -> ExecutorResult<Option<HostState>> {
        let context = ModuleContext::new(plan.host.clone(), connection)
            .with_check_mode(self.check_mode)
            .with_diff_mode(self.diff_mode)
            .with_vars(plan.vars.clone());
        let mut dispatcher = HandlerDispatcher::new(&self.play.handlers);

        let mut tasks = plan.tasks.iter();
        while let Some(planned) = tasks.next() {
            if self.cancel.is_cancelled() {
                info!("Stop requested, halting host");
                return Ok(None);
            }
            let task = &self.play.tasks[planned.task_index];
            let step = self
                .run_task(task, &planned.disposition, false, &context, recorder, &mut dispatcher)
                .await?;

            match step {
                Step::Continue => {}
                Step::Halt(HostState::Unreachable) => {
                    let message = format!("host {} became unreachable", plan.host);
                    for rest in tasks.by_ref() {
                        let rest = &self.play.tasks[rest.task_index];
                        self.record(recorder, unreachable(rest, &message)).await?;
                    }
                    return Ok(Some(HostState::Unreachable));
                }
                Step::Halt(HostState::Running) => return Ok(None),
                Step::Halt(other) => return Ok(Some(other)),
            }
        }

        if dispatcher.has_pending() {
            self.callback
                .on_handlers_start(&plan.host, &dispatcher.pending_names())
                .await;
        }
        while let Some((idx, handler)) = dispatcher.next_pending() {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let disposition = plan.handlers.get(idx).cloned().unwrap_or(Disposition::Run);
            match self
                .run_task(&handler.task, &disposition, true, &context, recorder, &mut dispatcher)
                .await?
            {
                Step::Continue => {}
                Step::Halt(HostState::Unreachable) => {
                    let message = format!("host {} became unreachable", plan.host);
                    while let Some((_, rest)) = dispatcher.next_pending() {
                        let mut result = unreachable(&rest.task, &message);
                        result.handler = true;
                        self.record(recorder, result).await?;
                    }
                    return Ok(Some(HostState::Unreachable));
                }
                Step::Halt(HostState::Running) => return Ok(None),
                Step::Halt(other) => return Ok(Some(other)),
            }
        }

        Ok(Some(HostState::Completed))
    }

    /// Run one task or handler and record its result.
    ///
    /// `Halt(Running)` means the run was aborted from the step prompt.
    async fn run_task(
        &self,
        task: &Task,
        disposition: &Disposition,
        handler: bool,
        context: &ModuleContext,
        recorder: &mut HostRecorder,
        dispatcher: &mut HandlerDispatcher<'_>,
    ) -> ExecutorResult<Step> {
        if let Disposition::Skip { reason } = disposition {
            let mut result = skipped(task, reason);
            result.handler = handler;
            self.record(recorder, result).await?;
            return Ok(Step::Continue);
        }

        match self.step.check(&context.host, &task.name).await {
            StepAnswer::Yes | StepAnswer::Continue => {}
            StepAnswer::No => {
                let mut result = skipped(task, "skipped at step prompt");
                result.handler = handler;
                self.record(recorder, result).await?;
                return Ok(Step::Continue);
            }
            StepAnswer::Abort => {
                warn!("Run aborted at step prompt");
                self.cancel.cancel();
                return Ok(Step::Halt(HostState::Running));
            }
        }

        debug!(task = %task.name, module = %task.module, handler, "Running task");
        self.callback.on_task_start(&task.name, &context.host).await;

        let (outcome, attempts) = self.apply_with_retries(task, context).await;
        let status = outcome.status;
        let changed = outcome.is_changed();

        let mut result = outcome.into_result(task, attempts);
        result.handler = handler;
        result.ignored = match status {
            TaskStatus::Failed => task.ignore_errors,
            TaskStatus::Unreachable => task.ignore_unreachable,
            _ => false,
        };
        if result.ignored {
            warn!(task = %task.name, status = %status, "Ignoring task failure");
        }
        let ignored = result.ignored;
        self.record(recorder, result).await?;

        if changed {
            dispatcher.notify_all(&task.notify);
        }

        Ok(match status {
            TaskStatus::Failed if !ignored => Step::Halt(HostState::Failed),
            TaskStatus::Unreachable if !ignored => Step::Halt(HostState::Unreachable),
            _ => Step::Continue,
        })
    }

    async fn apply_with_retries(&self, task: &Task, context: &ModuleContext) -> (ApplyOutcome, u32) {
        let max_attempts = task.retries.saturating_add(1);
        let delay = task
            .delay
            .map(Duration::from_secs)
            .unwrap_or(self.default_retry_delay);

        let mut attempt = 1;
        loop {
            let outcome = self.applier.apply(task, context).await;
            if outcome.status != TaskStatus::Failed || attempt >= max_attempts {
                return (outcome, attempt);
            }

            warn!(
                task = %task.name,
                attempt,
                max_attempts,
                error = %outcome.msg,
                "Task failed, retrying"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return (outcome, attempt),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn record(&self, recorder: &mut HostRecorder, mut result: ExecutionResult) -> ExecutorResult<()> {
        result.host = recorder.host().to_string();
        result.index = recorder.recorded();
        self.callback.on_task_complete(&result).await;
        recorder.record(result)?;
        Ok(())
    }
}

fn transition(host: &str, state: &mut HostState, next: HostState) {
    if !state.can_transition_to(next) {
        warn!(host = %host, from = %state, to = %next, "Unexpected host state transition");
    }
    debug!(host = %host, from = %state, to = %next, "Host state");
    *state = next;
}

fn skipped(task: &Task, reason: &str) -> ExecutionResult {
    ExecutionResult::new(&task.name, &task.module, TaskStatus::Skipped, reason)
}

fn unreachable(task: &Task, message: &str) -> ExecutionResult {
    let mut result = ExecutionResult::new(&task.name, &task.module, TaskStatus::Unreachable, message);
    result.diagnostic = Some(Diagnostic::new(message, TargetState::Unchanged));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::Handler;
    use tempfile::TempDir;

    fn inventory(root: &TempDir) -> Arc<Inventory> {
        let ini = format!(
            "[web]\nweb1 converge_root={root}\nweb2 converge_root={root}\n\n[db]\ndb1 converge_connection=ssh\n",
            root = root.path().display()
        );
        Arc::new(Inventory::from_ini_str(&ini).unwrap())
    }

    fn statuses(report: &PlayReport, host: &str) -> Vec<TaskStatus> {
        report.host_results(host).map(|r| r.status).collect()
    }

    #[tokio::test]
    async fn test_runs_and_reports() {
        let temp = TempDir::new().unwrap();
        let play = Play::new("site", "web1")
            .task(Task::new("hello", "debug").arg("msg", "hi"))
            .task(Task::new("touch", "file").arg("path", "/flag").arg("state", "touch"));
        let playbook = Playbook {
            path: None,
            plays: vec![play],
        };

        let executor = Executor::new(inventory(&temp), ExecutorConfig::default());
        let report = executor.run(&playbook).await.unwrap();

        let play = &report.plays[0];
        assert_eq!(play.host_states["web1"], HostState::Completed);
        assert_eq!(statuses(play, "web1"), vec![TaskStatus::Ok, TaskStatus::Changed]);
        assert!(!play.host_states.contains_key("web2"));
        assert!(report.is_success());
        assert!(temp.path().join("flag").exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_marks_every_task() {
        let temp = TempDir::new().unwrap();
        let play = Play::new("db", "db")
            .task(Task::new("a", "debug"))
            .task(Task::new("b", "debug"));
        let playbook = Playbook {
            path: None,
            plays: vec![play],
        };

        let report = Executor::new(inventory(&temp), ExecutorConfig::default())
            .run(&playbook)
            .await
            .unwrap();

        let play = &report.plays[0];
        assert_eq!(play.host_states["db1"], HostState::Unreachable);
        assert_eq!(
            statuses(play, "db1"),
            vec![TaskStatus::Unreachable, TaskStatus::Unreachable]
        );
        assert_eq!(report.exit_status().code(), 3);
    }

    #[tokio::test]
    async fn test_failure_halts_host_and_skips_handlers() {
        let temp = TempDir::new().unwrap();
        let play = Play::new("p", "web1")
            .task(Task::new("write", "copy").arg("dest", "/a").arg("content", "x").notify("h"))
            .task(Task::new("boom", "command").arg("cmd", "exit 1"))
            .task(Task::new("never", "debug"))
            .handler(Handler::new(Task::new("h", "debug")));
        let playbook = Playbook {
            path: None,
            plays: vec![play],
        };

        let report = Executor::new(inventory(&temp), ExecutorConfig::default())
            .run(&playbook)
            .await
            .unwrap();

        let play = &report.plays[0];
        assert_eq!(play.host_states["web1"], HostState::Failed);
        assert_eq!(
            statuses(play, "web1"),
            vec![TaskStatus::Changed, TaskStatus::Failed]
        );
        assert_eq!(report.exit_status().code(), 2);
    }

    #[tokio::test]
    async fn test_ignore_errors_continues() {
        let temp = TempDir::new().unwrap();
        let play = Play::new("p", "web1")
            .task(
                Task::new("boom", "command")
                    .arg("cmd", "exit 1")
                    .ignore_errors(true),
            )
            .task(Task::new("after", "debug"));
        let playbook = Playbook {
            path: None,
            plays: vec![play],
        };

        let report = Executor::new(inventory(&temp), ExecutorConfig::default())
            .run(&playbook)
            .await
            .unwrap();
        let play = &report.plays[0];
        assert_eq!(play.host_states["web1"], HostState::Completed);
        assert!(play.results[0].ignored);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let temp = TempDir::new().unwrap();
        let play = Play::new("p", "web1")
            .task(Task::new("flaky", "command").arg("cmd", "exit 1").retries(2, 0));
        let playbook = Playbook {
            path: None,
            plays: vec![play],
        };

        let report = Executor::new(inventory(&temp), ExecutorConfig::default())
            .run(&playbook)
            .await
            .unwrap();
        assert_eq!(report.plays[0].results[0].attempts, 3);
        assert_eq!(report.plays[0].results[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let temp = TempDir::new().unwrap();
        let playbook = Playbook {
            path: None,
            plays: vec![Play::new("p", "web").task(Task::new("a", "debug"))],
        };
        let executor = Executor::new(inventory(&temp), ExecutorConfig::default());
        executor.cancellation_token().cancel();

        let report = executor.run(&playbook).await.unwrap();
        assert!(report.interrupted);
        assert!(report.plays.is_empty());
        assert_eq!(report.exit_status().code(), 99);
    }

    #[tokio::test]
    async fn test_structural_error_before_running() {
        let temp = TempDir::new().unwrap();
        let playbook = Playbook {
            path: None,
            plays: vec![
                Play::new("ok", "web").task(Task::new("touch", "file").arg("path", "/x").arg("state", "touch")),
                Play::new("bad", "nosuchgroup").task(Task::new("a", "debug")),
            ],
        };
        let err = Executor::new(inventory(&temp), ExecutorConfig::default())
            .run(&playbook)
            .await
            .unwrap_err();
        assert!(err.is_structural());
        assert!(!temp.path().join("x").exists());
    }
}
