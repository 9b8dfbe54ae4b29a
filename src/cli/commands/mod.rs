//! Subcommands module for the converge CLI
//!
//! This module contains all the subcommand implementations.

pub mod check;
pub mod inventory;
pub mod run;
pub mod syntax;

use anyhow::{Context, Result};
use clap::Args;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::cli::output::OutputFormatter;
use crate::cli::Cli;
use converge::config::{Config, OutputFormat};
use converge::error::Error;
use converge::executor::{ExecutorConfig, GraphBuilder, PlayGraph};
use converge::inventory::{HostSelector, Inventory};
use converge::modules::ModuleRegistry;
use converge::playbook::Playbook;
use converge::tags::{parse_tag_list, TagFilter};

/// Playbook selection arguments shared by `run`, `check`, `syntax-check`
/// and `list-tasks`
#[derive(Args, Debug, Clone, Default)]
pub struct PlaybookArgs {
    /// Path to the playbook file
    #[arg(required = true)]
    pub playbook: PathBuf,

    /// Tags to run (only tasks with these tags)
    #[arg(long, short = 't', action = clap::ArgAction::Append)]
    pub tags: Vec<String>,

    /// Tags to skip (skip tasks with these tags)
    #[arg(long, action = clap::ArgAction::Append)]
    pub skip_tags: Vec<String>,

    /// Start at the first task with this name
    #[arg(long)]
    pub start_at_task: Option<String>,
}

impl PlaybookArgs {
    pub fn tag_filter(&self) -> TagFilter {
        TagFilter::new()
            .with_tags(parse_tag_list(&self.tags))
            .with_skip_tags(parse_tag_list(&self.skip_tags))
    }
}

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Inventory path from the command line
    pub inventory_path: Option<PathBuf>,
    /// Raw `-e` arguments
    pub extra_vars: Vec<String>,
    /// Verbosity level
    pub verbosity: u8,
    /// Check mode (dry-run)
    pub check_mode: bool,
    /// Diff mode
    pub diff_mode: bool,
    /// Limit selector
    pub limit: Option<String>,
    /// Number of hosts worked on at once
    pub forks: usize,
    /// Tripped on Ctrl-C
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, config: Config, cancel: CancellationToken) -> Self {
        let format = cli.output.unwrap_or(config.output.format);
        let output = OutputFormatter::new(
            config.colors.enabled && !cli.no_color,
            format == OutputFormat::Json,
            cli.verbosity(),
        )
        .with_colors(config.colors.clone())
        .with_diff_mode(cli.diff_mode);

        Self {
            forks: cli.forks.unwrap_or(config.defaults.forks),
            inventory_path: cli.inventory.clone(),
            extra_vars: cli.extra_vars.clone(),
            verbosity: cli.verbosity(),
            check_mode: cli.check_mode,
            diff_mode: cli.diff_mode,
            limit: cli.limit.clone(),
            config,
            output,
            cancel,
        }
    }

    /// Get the effective inventory path
    pub fn inventory(&self) -> Option<&Path> {
        self.inventory_path
            .as_deref()
            .or_else(|| self.config.inventory_path())
    }

    /// Load the inventory, or an empty one (just `all`) when none is configured
    pub fn load_inventory(&self) -> Result<Inventory> {
        match self.inventory() {
            Some(path) => {
                self.output
                    .info(&format!("Using inventory {}", path.display()));
                Inventory::load(path)
                    .map_err(Error::from)
                    .with_context(|| format!("inventory {}", path.display()))
            }
            None => {
                self.output
                    .warning("No inventory specified, only 'all' with no hosts is available");
                Ok(Inventory::new())
            }
        }
    }

    pub fn load_playbook(&self, path: &Path) -> Result<Playbook> {
        Playbook::load(path).map_err(|e| Error::from(e).into())
    }

    pub fn limit_selector(&self) -> Result<Option<HostSelector>> {
        self.limit
            .as_deref()
            .map(|l| HostSelector::parse(l).map_err(Error::from))
            .transpose()
            .context("--limit")
    }

    /// Parse extra variables: `key=value` pairs (values read as YAML scalars)
    /// and `@file` references to YAML/JSON mappings
    pub fn parse_extra_vars(&self) -> Result<IndexMap<String, JsonValue>> {
        parse_extra_vars(&self.extra_vars).map_err(Into::into)
    }

    pub fn executor_config(&self, args: &PlaybookArgs) -> Result<ExecutorConfig> {
        if self.forks == 0 {
            return Err(Error::config("--forks must be at least 1").into());
        }
        Ok(ExecutorConfig {
            forks: self.forks,
            check_mode: self.check_mode,
            diff_mode: self.diff_mode,
            step: false,
            default_retry_delay: self.config.retry_delay(),
            extra_vars: self.parse_extra_vars()?,
            limit: self.limit_selector()?,
            tag_filter: args.tag_filter(),
            start_at_task: args.start_at_task.clone(),
        })
    }

    /// Load everything and expand the playbook without running it
    pub fn expand(&self, args: &PlaybookArgs) -> Result<(Inventory, Vec<PlayGraph>)> {
        let inventory = self.load_inventory()?;
        let playbook = self.load_playbook(&args.playbook)?;
        let config = self.executor_config(args)?;
        let registry = ModuleRegistry::with_builtins();

        let graphs = GraphBuilder::new(&inventory)
            .with_registry(&registry)
            .with_tag_filter(config.tag_filter)
            .with_limit(config.limit)
            .with_extra_vars(config.extra_vars)
            .with_start_at_task(config.start_at_task)
            .build(&playbook)
            .map_err(Error::from)?;
        Ok((inventory, graphs))
    }
}

pub fn parse_extra_vars(inputs: &[String]) -> converge::error::Result<IndexMap<String, JsonValue>> {
    let mut vars = IndexMap::new();

    for input in inputs {
        if let Some(file_path) = input.strip_prefix('@') {
            let content = std::fs::read_to_string(file_path)
                .map_err(|e| Error::extra_vars(input, e.to_string()))?;
            let file_vars: IndexMap<String, JsonValue> = serde_yaml::from_str(&content)
                .map_err(|e| Error::extra_vars(input, e.to_string()))?;
            vars.extend(file_vars);
        } else if let Some((key, value)) = input.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::extra_vars(input, "empty variable name"));
            }
            let parsed: JsonValue = serde_yaml::from_str(value)
                .ok()
                .filter(|v: &JsonValue| !v.is_object() && !v.is_array())
                .unwrap_or_else(|| JsonValue::String(value.to_string()));
            vars.insert(key.to_string(), parsed);
        } else {
            return Err(Error::extra_vars(input, "expected key=value or @file"));
        }
    }

    Ok(vars)
}
