//! # Converge - declarative configuration orchestration
//!
//! Converge reads an inventory of hosts and a playbook of plays, expands each
//! play into an ordered task list per host, and drives every host towards the
//! declared state: hosts in parallel up to a fork limit, tasks strictly in
//! order within a host.
//!
//! ## Core Concepts
//!
//! - **Inventory**: hosts organized into (possibly nested) groups, each with
//!   variables; group vars are overridden by host vars
//! - **Playbook**: an ordered list of plays, each binding a host selector to
//!   tasks and handlers
//! - **Modules**: idempotent units of work. Each observes the target, plans
//!   the minimal change, then applies it (or only predicts it in check mode)
//! - **Handlers**: deferred tasks that run once per host when notified by a
//!   task that changed something
//! - **Connections**: the transport used to reach a host
//!
//! ## Architecture Overview
//!
//! ```text
//! inventory ──► graph builder ──► executor ──► applier (per task)
//!                  (per host          │              │
//!                   task lists)       ▼              ▼
//!                               handler dispatch   modules ──► connection
//!                                     │
//!                                     ▼
//!                               result log ──► RunReport
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use converge::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let inventory = Arc::new(Inventory::load("inventory.ini")?);
//! let playbook = Playbook::load("site.yml")?;
//!
//! let executor = Executor::new(inventory, ExecutorConfig::default());
//! let report = executor.run(&playbook).await?;
//!
//! println!("{}", report.summary());
//! std::process::exit(report.exit_status().code());
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::callback::{CompositeCallback, ExecutionCallback, NullCallback};
    pub use crate::config::Config;
    pub use crate::connection::{
        CommandResult, Connection, ConnectionError, ConnectionFactory, ConnectionResult,
        ExecuteOptions, FileStat, LocalConnection, LocalConnectionFactory, TransferOptions,
    };
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Executor, ExecutorConfig, GraphBuilder, PlayGraph};
    pub use crate::inventory::{Group, Host, HostSelector, Inventory};
    pub use crate::modules::{Module, ModuleContext, ModuleOutput, ModuleRegistry};
    pub use crate::playbook::{Handler, Play, Playbook, Task};
    pub use crate::report::{ExecutionResult, ExitStatus, HostState, RunReport, TaskStatus};
    pub use crate::tags::TagFilter;
    pub use crate::vars::{HostVars, VarPrecedence};
}

// ============================================================================
// Core
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// Layered configuration: defaults, config files, environment.
pub mod config;

/// Variable layers and precedence.
///
/// Lowest to highest: the `all` group, named groups (parents before
/// children), the host, play vars, then `-e` overrides. A key set by a higher
/// layer replaces the lower value outright; nested values are not merged.
pub mod vars;

// ============================================================================
// Declarations
// ============================================================================

/// Host and group inventory, plus host selector expressions.
pub mod inventory;

/// Playbook parsing and representation.
pub mod playbook;

/// `--tags` / `--skip-tags` selection.
pub mod tags;

// ============================================================================
// Execution
// ============================================================================

/// Task graph expansion and the execution engine.
///
/// See [`executor::Executor`] for the run model.
pub mod executor;

/// Handler notification and deduplication.
pub mod handlers;

/// Built-in modules and the module registry.
pub mod modules;

/// Connection layer for reaching hosts.
pub mod connection;

// ============================================================================
// Reporting
// ============================================================================

/// Execution results, per-play and per-run reports, exit status.
pub mod report;

/// Hooks for observing a run as it happens.
pub mod callback;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
pub fn version() -> &'static str {
    VERSION
}
