//! Shared test utilities and fixtures for the converge test suite.
//!
//! This module provides:
//! - An in-memory [`MockConnection`]: a virtual filesystem, scripted command
//!   results and injectable connection loss
//! - A [`MockConnectionFactory`] handing out one mock per host, with hosts
//!   that can be marked unreachable
//! - A [`RecordingCallback`] capturing run events in order
//! - Builders for inventories, playbooks and executors
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use converge::callback::ExecutionCallback;
use converge::connection::{
    CommandResult, Connection, ConnectionError, ConnectionFactory, ConnectionResult,
    ExecuteOptions, FileStat, TransferOptions,
};
use converge::executor::{Executor, ExecutorConfig};
use converge::inventory::Inventory;
use converge::playbook::Playbook;
use converge::report::{ExecutionResult, PlayReport, RunReport, TaskStatus};
use converge::vars::HostVars;

// ============================================================================
// Mock Connection Implementation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualEntry {
    File { content: Vec<u8>, mode: u32 },
    Dir { mode: u32 },
}

/// A connection backed entirely by memory.
///
/// ```rust,ignore
/// let mock = MockConnection::new("web1");
/// mock.set_command_result("systemctl reload nginx", CommandResult::success(String::new(), String::new()));
/// mock.add_file("/etc/motd", "hello");
/// ```
pub struct MockConnection {
    identifier: String,
    alive: AtomicBool,
    fs: RwLock<BTreeMap<PathBuf, VirtualEntry>>,
    command_results: RwLock<HashMap<String, VecDeque<CommandResult>>>,
    default_result: RwLock<CommandResult>,
    commands_executed: RwLock<Vec<String>>,
    /// Operations left before the connection drops; `None` never drops
    ops_before_drop: Mutex<Option<usize>>,
    writes: AtomicUsize,
}

impl MockConnection {
    /// Create a new mock connection with the given identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        let mut fs = BTreeMap::new();
        fs.insert(PathBuf::from("/"), VirtualEntry::Dir { mode: 0o755 });
        Self {
            identifier: identifier.into(),
            alive: AtomicBool::new(true),
            fs: RwLock::new(fs),
            command_results: RwLock::new(HashMap::new()),
            default_result: RwLock::new(CommandResult::success(String::new(), String::new())),
            commands_executed: RwLock::new(Vec::new()),
            ops_before_drop: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// Script the result of a command. Queued results are returned in order;
    /// the last one repeats.
    pub fn set_command_result(&self, command: &str, result: CommandResult) {
        self.command_results
            .write()
            .entry(command.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn set_default_result(&self, result: CommandResult) {
        *self.default_result.write() = result;
    }

    /// Drop the connection after `ops` more operations
    pub fn drop_after(&self, ops: usize) {
        *self.ops_before_drop.lock() = Some(ops);
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl AsRef<[u8]>) {
        let path = path.as_ref().to_path_buf();
        self.ensure_parents(&path);
        self.fs.write().insert(
            path,
            VirtualEntry::File {
                content: content.as_ref().to_vec(),
                mode: 0o644,
            },
        );
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.ensure_parents(&path);
        self.fs.write().insert(path, VirtualEntry::Dir { mode: 0o755 });
    }

    pub fn file_content(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.fs.read().get(path.as_ref()) {
            Some(VirtualEntry::File { content, .. }) => {
                Some(String::from_utf8_lossy(content).into_owned())
            }
            _ => None,
        }
    }

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<VirtualEntry> {
        self.fs.read().get(path.as_ref()).cloned()
    }

    /// Snapshot of the whole virtual filesystem
    pub fn snapshot(&self) -> BTreeMap<PathBuf, VirtualEntry> {
        self.fs.read().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands_executed.read().clone()
    }

    pub fn command_count(&self, command: &str) -> usize {
        self.commands_executed
            .read()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    /// Number of mutating operations performed
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_parents(&self, path: &Path) {
        let mut fs = self.fs.write();
        for ancestor in path.ancestors().skip(1) {
            fs.entry(ancestor.to_path_buf())
                .or_insert(VirtualEntry::Dir { mode: 0o755 });
        }
    }

    fn check_alive(&self) -> ConnectionResult<()> {
        let mut remaining = self.ops_before_drop.lock();
        if let Some(left) = remaining.as_mut() {
            if *left == 0 {
                self.alive.store(false, Ordering::SeqCst);
            } else {
                *left -= 1;
            }
        }
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::ConnectionClosed)
        }
    }

    fn mutated(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        command: &str,
        _options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        self.check_alive()?;
        self.commands_executed.write().push(command.to_string());

        let mut scripted = self.command_results.write();
        if let Some(queue) = scripted.get_mut(command) {
            if queue.len() > 1 {
                if let Some(result) = queue.pop_front() {
                    return Ok(result);
                }
            }
            if let Some(result) = queue.front() {
                return Ok(result.clone());
            }
        }
        Ok(self.default_result.read().clone())
    }

    async fn upload_content(
        &self,
        content: &[u8],
        remote_path: &Path,
        options: Option<TransferOptions>,
    ) -> ConnectionResult<()> {
        self.check_alive()?;
        let options = options.unwrap_or_default();
        if options.create_dirs {
            self.ensure_parents(remote_path);
        }

        let mut fs = self.fs.write();
        let parent_ok = remote_path
            .parent()
            .map_or(true, |p| matches!(fs.get(p), Some(VirtualEntry::Dir { .. })));
        if !parent_ok {
            return Err(ConnectionError::TransferFailed(format!(
                "parent of {} does not exist",
                remote_path.display()
            )));
        }
        if matches!(fs.get(remote_path), Some(VirtualEntry::Dir { .. })) {
            return Err(ConnectionError::TransferFailed(format!(
                "{} is a directory",
                remote_path.display()
            )));
        }

        let mode = options.mode.unwrap_or(match fs.get(remote_path) {
            Some(VirtualEntry::File { mode, .. }) => *mode,
            _ => 0o644,
        });
        fs.insert(
            remote_path.to_path_buf(),
            VirtualEntry::File {
                content: content.to_vec(),
                mode,
            },
        );
        self.mutated();
        Ok(())
    }

    async fn download_content(&self, remote_path: &Path) -> ConnectionResult<Vec<u8>> {
        self.check_alive()?;
        match self.fs.read().get(remote_path) {
            Some(VirtualEntry::File { content, .. }) => Ok(content.clone()),
            _ => Err(ConnectionError::TransferFailed(format!(
                "File not found in virtual filesystem: {}",
                remote_path.display()
            ))),
        }
    }

    async fn path_exists(&self, path: &Path) -> ConnectionResult<bool> {
        self.check_alive()?;
        Ok(self.fs.read().contains_key(path))
    }

    async fn is_directory(&self, path: &Path) -> ConnectionResult<bool> {
        self.check_alive()?;
        Ok(matches!(self.fs.read().get(path), Some(VirtualEntry::Dir { .. })))
    }

    async fn stat(&self, path: &Path) -> ConnectionResult<Option<FileStat>> {
        self.check_alive()?;
        Ok(self.fs.read().get(path).map(|entry| match entry {
            VirtualEntry::File { content, mode } => FileStat {
                size: content.len() as u64,
                mode: *mode,
                is_dir: false,
                is_file: true,
                is_symlink: false,
            },
            VirtualEntry::Dir { mode } => FileStat {
                size: 4096,
                mode: *mode,
                is_dir: true,
                is_file: false,
                is_symlink: false,
            },
        }))
    }

    async fn create_dir(&self, path: &Path, mode: Option<u32>) -> ConnectionResult<()> {
        self.check_alive()?;
        if matches!(self.fs.read().get(path), Some(VirtualEntry::File { .. })) {
            return Err(ConnectionError::ExecutionFailed(format!(
                "{} exists and is a file",
                path.display()
            )));
        }
        self.ensure_parents(path);
        self.fs.write().insert(
            path.to_path_buf(),
            VirtualEntry::Dir {
                mode: mode.unwrap_or(0o755),
            },
        );
        self.mutated();
        Ok(())
    }

    async fn remove(&self, path: &Path) -> ConnectionResult<()> {
        self.check_alive()?;
        self.fs.write().retain(|p, _| !p.starts_with(path));
        self.mutated();
        Ok(())
    }

    async fn set_mode(&self, path: &Path, new_mode: u32) -> ConnectionResult<()> {
        self.check_alive()?;
        match self.fs.write().get_mut(path) {
            Some(VirtualEntry::File { mode, .. }) | Some(VirtualEntry::Dir { mode }) => {
                *mode = new_mode;
                self.mutated();
                Ok(())
            }
            None => Err(ConnectionError::ExecutionFailed(format!(
                "{} does not exist",
                path.display()
            ))),
        }
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }
}

// ============================================================================
// Mock Connection Factory
// ============================================================================

/// Hands out one [`MockConnection`] per host, reused across plays and runs
#[derive(Default)]
pub struct MockConnectionFactory {
    connections: RwLock<HashMap<String, Arc<MockConnection>>>,
    unreachable: RwLock<HashSet<String>>,
    connects: AtomicUsize,
}

impl MockConnectionFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse connections to `host`
    pub fn set_unreachable(&self, host: &str) {
        self.unreachable.write().insert(host.to_string());
    }

    /// The mock used for `host`, created on first use
    pub fn connection(&self, host: &str) -> Arc<MockConnection> {
        Arc::clone(
            self.connections
                .write()
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(MockConnection::new(host))),
        )
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(&self, host: &str, _vars: &HostVars) -> ConnectionResult<Arc<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.read().contains(host) {
            return Err(ConnectionError::Unreachable {
                host: host.to_string(),
                message: "connection refused".to_string(),
            });
        }
        let conn: Arc<dyn Connection> = self.connection(host);
        Ok(conn)
    }
}

// ============================================================================
// Recording callback
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    PlayStart(String),
    TaskStart { task: String, host: String },
    TaskComplete { task: String, host: String, status: TaskStatus },
    HandlersStart { host: String, handlers: Vec<String> },
    PlayEnd(String),
    RunEnd,
}

/// Captures every callback event in arrival order
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<Event>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Events concerning one host, in order
    pub fn host_events(&self, host: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                Event::TaskStart { host: h, .. }
                | Event::TaskComplete { host: h, .. }
                | Event::HandlersStart { host: h, .. } => h == host,
                _ => false,
            })
            .collect()
    }
}

#[async_trait]
impl ExecutionCallback for RecordingCallback {
    async fn on_play_start(&self, name: &str, _hosts: &[String]) {
        self.events.lock().push(Event::PlayStart(name.to_string()));
    }

    async fn on_task_start(&self, name: &str, host: &str) {
        self.events.lock().push(Event::TaskStart {
            task: name.to_string(),
            host: host.to_string(),
        });
    }

    async fn on_task_complete(&self, result: &ExecutionResult) {
        self.events.lock().push(Event::TaskComplete {
            task: result.task.clone(),
            host: result.host.clone(),
            status: result.status,
        });
    }

    async fn on_handlers_start(&self, host: &str, handlers: &[String]) {
        self.events.lock().push(Event::HandlersStart {
            host: host.to_string(),
            handlers: handlers.to_vec(),
        });
    }

    async fn on_play_end(&self, report: &PlayReport) {
        self.events.lock().push(Event::PlayEnd(report.name.clone()));
    }

    async fn on_run_end(&self, _report: &RunReport) {
        self.events.lock().push(Event::RunEnd);
    }
}

// ============================================================================
// Builders
// ============================================================================

/// The inventory most integration tests run against
pub const WEB_INVENTORY: &str = "\
[nginx]
web1
web2
web3

[apache]
app1

[webservers:children]
nginx
apache

[all:vars]
port=80
";

pub fn inventory(ini: &str) -> Arc<Inventory> {
    Arc::new(Inventory::from_ini_str(ini).expect("inventory parses"))
}

pub fn playbook(yaml: &str) -> Playbook {
    Playbook::parse(yaml, None).expect("playbook parses")
}

/// Config with no retry pauses
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        default_retry_delay: std::time::Duration::ZERO,
        ..ExecutorConfig::default()
    }
}

pub fn executor(
    inventory: Arc<Inventory>,
    config: ExecutorConfig,
    factory: &Arc<MockConnectionFactory>,
) -> Executor {
    Executor::new(inventory, config).with_connection_factory(Arc::clone(factory) as Arc<dyn ConnectionFactory>)
}

/// Statuses recorded for `host` across every play, in order
pub fn statuses(report: &RunReport, host: &str) -> Vec<TaskStatus> {
    report
        .plays
        .iter()
        .flat_map(|p| p.host_results(host))
        .map(|r| r.status)
        .collect()
}

/// Task names recorded for `host`, in order
pub fn task_names(report: &RunReport, host: &str) -> Vec<String> {
    report
        .plays
        .iter()
        .flat_map(|p| p.host_results(host))
        .map(|r| r.task.clone())
        .collect()
}
