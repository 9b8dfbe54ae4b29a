//! Result reporting
//!
//! Workers write results into a [`ResultLog`], an append-only concurrent map
//! keyed by `(host, index)`. Each worker holds a [`HostRecorder`] for its own
//! host, so no two workers ever write the same key, and a key is never
//! written twice. Once a play finishes, the log is frozen into a
//! [`PlayReport`]; the plays of a run are aggregated into a [`RunReport`].

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::modules::{Diff, ModuleOutput};

/// Outcome of one task on one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ok,
    Changed,
    Failed,
    Skipped,
    Unreachable,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Ok => write!(f, "ok"),
            TaskStatus::Changed => write!(f, "changed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
            TaskStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// What is known about the target after a failed apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// The failure happened before anything was mutated
    Unchanged,
    /// The failure happened while changes were being made
    Unknown,
}

/// Details captured when a task fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    pub target_state: TargetState,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, target_state: TargetState) -> Self {
        Self {
            message: message.into(),
            stdout: None,
            stderr: None,
            rc: None,
            target_state,
        }
    }

    pub fn with_command_output(mut self, stdout: String, stderr: String, rc: i32) -> Self {
        self.stdout = Some(stdout);
        self.stderr = Some(stderr);
        self.rc = Some(rc);
        self
    }
}

/// Per-host lifecycle within one play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Pending,
    Running,
    Completed,
    Failed,
    Unreachable,
}

impl HostState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HostState::Completed | HostState::Failed | HostState::Unreachable
        )
    }

    /// `pending -> running -> {completed, failed, unreachable}`
    pub fn can_transition_to(&self, next: HostState) -> bool {
        matches!(
            (self, next),
            (HostState::Pending, HostState::Running)
                | (HostState::Running, HostState::Completed)
                | (HostState::Running, HostState::Failed)
                | (HostState::Running, HostState::Unreachable)
        )
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostState::Pending => "pending",
            HostState::Running => "running",
            HostState::Completed => "completed",
            HostState::Failed => "failed",
            HostState::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// One recorded (host, task) outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub host: String,
    pub index: usize,
    pub task: String,
    pub module: String,
    pub status: TaskStatus,
    pub msg: String,
    /// Result of a handler rather than a regular task
    #[serde(default)]
    pub handler: bool,
    /// Failure or unreachability was tolerated by the task
    #[serde(default)]
    pub ignored: bool,
    /// Check-mode prediction, nothing was applied
    #[serde(default)]
    pub predicted: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ModuleOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn new(
        task: impl Into<String>,
        module: impl Into<String>,
        status: TaskStatus,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            host: String::new(),
            index: 0,
            task: task.into(),
            module: module.into(),
            status,
            msg: msg.into(),
            handler: false,
            ignored: false,
            predicted: false,
            attempts: 0,
            diff: None,
            output: None,
            diagnostic: None,
            duration_ms: 0,
        }
    }

    /// Whether this entry makes the run unsuccessful
    pub fn is_failure(&self) -> bool {
        !self.ignored && matches!(self.status, TaskStatus::Failed | TaskStatus::Unreachable)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("result for host '{host}' task #{index} was already recorded")]
    DuplicateEntry { host: String, index: usize },
}

/// Append-only result store shared by all workers of a play
#[derive(Debug, Default)]
pub struct ResultLog {
    entries: DashMap<(String, usize), ExecutionResult>,
}

impl ResultLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a result. A key can only be written once.
    pub fn record(&self, result: ExecutionResult) -> Result<(), ReportError> {
        match self.entries.entry((result.host.clone(), result.index)) {
            Entry::Occupied(_) => Err(ReportError::DuplicateEntry {
                host: result.host,
                index: result.index,
            }),
            Entry::Vacant(slot) => {
                slot.insert(result);
                Ok(())
            }
        }
    }

    /// Hand out the writer for one host's key range
    pub fn recorder(self: &Arc<Self>, host: impl Into<String>) -> HostRecorder {
        HostRecorder {
            host: host.into(),
            log: Arc::clone(self),
            next_index: 0,
        }
    }

    pub fn get(&self, host: &str, index: usize) -> Option<ExecutionResult> {
        self.entries
            .get(&(host.to_string(), index))
            .map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All results for `host`, in recording order
    pub fn host_results(&self, host: &str) -> Vec<ExecutionResult> {
        let mut results: Vec<ExecutionResult> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == host)
            .map(|e| e.value().clone())
            .collect();
        results.sort_by_key(|r| r.index);
        results
    }
}

/// A worker's exclusive writer for its host
#[derive(Debug)]
pub struct HostRecorder {
    host: String,
    log: Arc<ResultLog>,
    next_index: usize,
}

impl HostRecorder {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Record the next result for this host, returning its index
    pub fn record(&mut self, mut result: ExecutionResult) -> Result<usize, ReportError> {
        let index = self.next_index;
        result.host = self.host.clone();
        result.index = index;
        self.log.record(result)?;
        self.next_index += 1;
        Ok(index)
    }

    pub fn recorded(&self) -> usize {
        self.next_index
    }
}

/// Per-host counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    pub ok: usize,
    pub changed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unreachable: usize,
    pub ignored: usize,
}

impl HostStats {
    pub fn add(&mut self, result: &ExecutionResult) {
        if result.ignored {
            self.ignored += 1;
            return;
        }
        match result.status {
            TaskStatus::Ok => self.ok += 1,
            TaskStatus::Changed => self.changed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Unreachable => self.unreachable += 1,
        }
    }

    fn merge(&mut self, other: &HostStats) {
        self.ok += other.ok;
        self.changed += other.changed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.unreachable += other.unreachable;
        self.ignored += other.ignored;
    }
}

/// Results of one play
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayReport {
    pub name: String,
    /// Selected hosts in selection order
    pub hosts: Vec<String>,
    pub host_states: IndexMap<String, HostState>,
    pub results: Vec<ExecutionResult>,
}

impl PlayReport {
    /// Freeze a play's log, ordering results by host then index
    pub fn from_log(
        name: impl Into<String>,
        hosts: Vec<String>,
        host_states: IndexMap<String, HostState>,
        log: &ResultLog,
    ) -> Self {
        let results = hosts
            .iter()
            .flat_map(|host| log.host_results(host))
            .collect();
        Self {
            name: name.into(),
            hosts,
            host_states,
            results,
        }
    }

    pub fn host_results<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a ExecutionResult> {
        self.results.iter().filter(move |r| r.host == host)
    }
}

/// Whether a run applied changes or only predicted them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Applied,
    DryRun,
}

/// Totals across all hosts and plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub hosts: usize,
    #[serde(flatten)]
    pub totals: HostStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.totals;
        match self.mode {
            RunMode::DryRun => write!(
                f,
                "DRY RUN on {} host(s): {} would change, {} ok, {} failed, {} skipped, {} unreachable, {} ignored",
                self.hosts, t.changed, t.ok, t.failed, t.skipped, t.unreachable, t.ignored
            ),
            RunMode::Applied => write!(
                f,
                "APPLIED on {} host(s): {} changed, {} ok, {} failed, {} skipped, {} unreachable, {} ignored",
                self.hosts, t.changed, t.ok, t.failed, t.skipped, t.unreachable, t.ignored
            ),
        }
    }
}

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Success,
    InternalError,
    HostsFailed,
    HostsUnreachable,
    InvalidInput,
    Interrupted,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::InternalError => 1,
            ExitStatus::HostsFailed => 2,
            ExitStatus::HostsUnreachable => 3,
            ExitStatus::InvalidInput => 4,
            ExitStatus::Interrupted => 99,
        }
    }
}

/// Aggregated results of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub plays: Vec<PlayReport>,
    pub check_mode: bool,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(check_mode: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            plays: Vec::new(),
            check_mode,
            interrupted: false,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Per-host counters across all plays, hosts in first-seen order
    pub fn stats(&self) -> IndexMap<String, HostStats> {
        let mut stats: IndexMap<String, HostStats> = IndexMap::new();
        for play in &self.plays {
            for host in &play.hosts {
                let mut play_stats = HostStats::default();
                for result in play.host_results(host) {
                    play_stats.add(result);
                }
                stats.entry(host.clone()).or_default().merge(&play_stats);
            }
        }
        stats
    }

    /// Totals, labelled as a dry run or an applied run
    pub fn summary(&self) -> RunSummary {
        let stats = self.stats();
        let mut totals = HostStats::default();
        for host_stats in stats.values() {
            totals.merge(host_stats);
        }
        RunSummary {
            mode: if self.check_mode {
                RunMode::DryRun
            } else {
                RunMode::Applied
            },
            hosts: stats.len(),
            totals,
        }
    }

    /// Hosts that ended any play in `state`
    pub fn hosts_in_state(&self, state: HostState) -> Vec<&str> {
        let mut hosts: Vec<&str> = Vec::new();
        for play in &self.plays {
            for (host, s) in &play.host_states {
                if *s == state && !hosts.contains(&host.as_str()) {
                    hosts.push(host.as_str());
                }
            }
        }
        hosts
    }

    /// Every recorded result grouped by host
    pub fn listing(&self) -> IndexMap<&str, Vec<&ExecutionResult>> {
        let mut listing: IndexMap<&str, Vec<&ExecutionResult>> = IndexMap::new();
        for play in &self.plays {
            for result in &play.results {
                listing.entry(result.host.as_str()).or_default().push(result);
            }
        }
        listing
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.interrupted {
            ExitStatus::Interrupted
        } else if !self.hosts_in_state(HostState::Failed).is_empty() {
            ExitStatus::HostsFailed
        } else if !self.hosts_in_state(HostState::Unreachable).is_empty() {
            ExitStatus::HostsUnreachable
        } else {
            ExitStatus::Success
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_status() == ExitStatus::Success
    }

    /// Machine-readable form used by `--output json`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "plays": self.plays,
            "stats": self.stats(),
            "summary": self.summary(),
            "check_mode": self.check_mode,
            "interrupted": self.interrupted,
            "started_at": self.started_at,
            "duration_ms": self.duration_ms,
            "exit_code": self.exit_status().code(),
        })
    }
}
