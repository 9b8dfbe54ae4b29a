//! CLI module for converge
//!
//! This module provides the command-line interface,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use converge::config::OutputFormat;
use std::path::PathBuf;

/// converge - declarative configuration orchestration
///
/// Resolves an inventory, expands plays into per-host task lists and drives
/// every selected host to the declared state.
#[derive(Parser, Debug, Clone)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Declarative configuration orchestration", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to inventory file or directory
    #[arg(short = 'i', long, global = true, env = "CONVERGE_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Extra variables (key=value or @file.yml)
    #[arg(short = 'e', long = "extra-vars", global = true, action = clap::ArgAction::Append)]
    pub extra_vars: Vec<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run in check mode (dry-run, don't make changes)
    #[arg(long = "check", global = true)]
    pub check_mode: bool,

    /// Show before/after differences for changed files
    #[arg(long = "diff", global = true)]
    pub diff_mode: bool,

    /// Output format (human or json)
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Limit execution to hosts matching a selector
    #[arg(short = 'l', long, global = true)]
    pub limit: Option<String>,

    /// Number of hosts worked on at once
    #[arg(short = 'f', long, global = true)]
    pub forks: Option<usize>,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a playbook
    Run(commands::run::RunArgs),

    /// Run a playbook in check mode (dry-run)
    Check(commands::check::CheckArgs),

    /// Parse the playbook and expand every play without running anything
    #[command(name = "syntax-check")]
    SyntaxCheck(commands::syntax::SyntaxCheckArgs),

    /// List the hosts a selector resolves to
    #[command(name = "list-hosts")]
    ListHosts(commands::inventory::ListHostsArgs),

    /// List the tasks each play would run, after tag filtering
    #[command(name = "list-tasks")]
    ListTasks(commands::inventory::ListTasksArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
