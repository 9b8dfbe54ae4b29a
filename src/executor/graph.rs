//! Task graph builder
//!
//! Expands each play into a per-host ordered task list before anything runs.
//! Host selection, `--tags`/`--skip-tags`, `--start-at-task` and `when`
//! conditions are all resolved here, so every structural problem (unknown
//! group, bad subscript, malformed or undefined condition, unknown module)
//! surfaces before a single host is touched.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, warn};

use super::condition::evaluate_all;
use super::{ExecutorError, ExecutorResult};
use crate::inventory::{HostSelector, Inventory};
use crate::modules::ModuleRegistry;
use crate::playbook::{Play, Playbook, Task};
use crate::tags::{self, TagFilter};
use crate::vars::{HostVars, VarLayer, VarPrecedence};

/// Whether a planned task runs or is recorded as skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Disposition {
    Run,
    Skip { reason: String },
}

impl Disposition {
    pub fn runs(&self) -> bool {
        matches!(self, Disposition::Run)
    }
}

/// One entry of a host's expanded task list
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTask {
    /// Position of the task in the play's task list
    pub task_index: usize,
    pub name: String,
    /// Effective tags, play tags included
    pub tags: Vec<String>,
    pub disposition: Disposition,
}

/// Expanded work for one host in one play
#[derive(Debug, Clone, Serialize)]
pub struct HostPlan {
    pub host: String,
    #[serde(skip)]
    pub vars: HostVars,
    pub tasks: Vec<PlannedTask>,
    /// Disposition of each handler, by definition index
    #[serde(skip)]
    pub handlers: Vec<Disposition>,
}

/// A play expanded against the inventory
#[derive(Debug, Clone)]
pub struct PlayGraph {
    pub play: Arc<Play>,
    pub hosts: Vec<HostPlan>,
}

impl PlayGraph {
    pub fn name(&self) -> &str {
        &self.play.name
    }

    pub fn task(&self, planned: &PlannedTask) -> &Task {
        &self.play.tasks[planned.task_index]
    }

    pub fn host_names(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.host.clone()).collect()
    }

    /// Distinct tasks across hosts, in play order, for `list-tasks`
    pub fn task_names(&self) -> Vec<(&str, &[String])> {
        let mut seen = IndexSet::new();
        let mut listing = Vec::new();
        for host in &self.hosts {
            for planned in &host.tasks {
                if seen.insert(planned.task_index) {
                    listing.push((planned.task_index, planned.name.as_str(), planned.tags.as_slice()));
                }
            }
        }
        listing.sort_by_key(|(idx, _, _)| *idx);
        listing.into_iter().map(|(_, name, tags)| (name, tags)).collect()
    }
}

/// Expands plays into per-host task lists
pub struct GraphBuilder<'a> {
    inventory: &'a Inventory,
    registry: Option<&'a ModuleRegistry>,
    tag_filter: TagFilter,
    limit: Option<HostSelector>,
    extra_vars: IndexMap<String, JsonValue>,
    start_at_task: Option<String>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        Self {
            inventory,
            registry: None,
            tag_filter: TagFilter::new(),
            limit: None,
            extra_vars: IndexMap::new(),
            start_at_task: None,
        }
    }

    /// Validate module names and parameters against `registry`
    pub fn with_registry(mut self, registry: &'a ModuleRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_tag_filter(mut self, filter: TagFilter) -> Self {
        self.tag_filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: Option<HostSelector>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_extra_vars(mut self, vars: IndexMap<String, JsonValue>) -> Self {
        self.extra_vars = vars;
        self
    }

    pub fn with_start_at_task(mut self, name: Option<String>) -> Self {
        self.start_at_task = name;
        self
    }

    /// Expand every play of the playbook
    pub fn build(&self, playbook: &Playbook) -> ExecutorResult<Vec<PlayGraph>> {
        self.validate_modules(playbook)?;

        let (first_play, first_task) = match &self.start_at_task {
            Some(name) => playbook
                .plays
                .iter()
                .enumerate()
                .find_map(|(pi, play)| {
                    play.tasks
                        .iter()
                        .position(|t| &t.name == name)
                        .map(|ti| (pi, ti))
                })
                .ok_or_else(|| ExecutorError::UnknownStartTask(name.clone()))?,
            None => (0, 0),
        };

        playbook
            .plays
            .iter()
            .enumerate()
            .skip(first_play)
            .map(|(pi, play)| {
                let skip = if pi == first_play { first_task } else { 0 };
                self.build_play(Arc::new(play.clone()), skip)
            })
            .collect()
    }

    fn validate_modules(&self, playbook: &Playbook) -> ExecutorResult<()> {
        let Some(registry) = self.registry else {
            return Ok(());
        };
        for play in &playbook.plays {
            let tasks = play.tasks.iter().chain(play.handlers.iter().map(|h| &h.task));
            for task in tasks {
                registry
                    .validate(&task.module, &task.args)
                    .map_err(|source| ExecutorError::InvalidTask {
                        play: play.name.clone(),
                        task: task.name.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Hosts a play runs on: its own selector intersected with `--limit`
    pub fn select_hosts(&self, play: &Play) -> ExecutorResult<Vec<String>> {
        let selector = HostSelector::parse(&play.hosts)?;
        let mut hosts: Vec<String> = selector
            .select(self.inventory)?
            .into_iter()
            .map(|h| h.name.clone())
            .collect();

        if let Some(limit) = &self.limit {
            let allowed: IndexSet<&str> = limit
                .select(self.inventory)?
                .into_iter()
                .map(|h| h.name.as_str())
                .collect();
            hosts.retain(|h| allowed.contains(h.as_str()));
        }

        Ok(hosts)
    }

    /// Expand one play, omitting its first `skip` tasks
    pub fn build_play(&self, play: Arc<Play>, skip: usize) -> ExecutorResult<PlayGraph> {
        let hosts = self.select_hosts(&play)?;
        if hosts.is_empty() {
            warn!(play = %play.name, selector = %play.hosts, "No hosts matched, skipping play");
        }

        let mut plans = Vec::with_capacity(hosts.len());
        for host in hosts {
            plans.push(self.build_host(&play, host, skip)?);
        }

        debug!(play = %play.name, hosts = plans.len(), "Expanded play");
        Ok(PlayGraph { play, hosts: plans })
    }

    fn host_vars(&self, play: &Play, host: &str) -> HostVars {
        self.inventory
            .host_vars(host)
            .unwrap_or_default()
            .with_layer(VarLayer::new(
                VarPrecedence::Play,
                play.name.clone(),
                play.vars.clone(),
            ))
            .with_layer(VarLayer::new(
                VarPrecedence::Extra,
                "extra vars",
                self.extra_vars.clone(),
            ))
    }

    fn disposition(
        &self,
        play: &Play,
        task: &Task,
        host: &str,
        vars: &HostVars,
    ) -> ExecutorResult<Disposition> {
        let passes = evaluate_all(&task.when, vars).map_err(|source| ExecutorError::Condition {
            play: play.name.clone(),
            task: task.name.clone(),
            host: host.to_string(),
            source,
        })?;

        if passes {
            Ok(Disposition::Run)
        } else {
            let failed = task
                .when
                .iter()
                .find(|c| !c.evaluate(vars).unwrap_or(false))
                .map(|c| c.as_str().to_string())
                .unwrap_or_default();
            Ok(Disposition::Skip {
                reason: format!("Conditional result was False: {}", failed),
            })
        }
    }

    fn build_host(&self, play: &Play, host: String, skip: usize) -> ExecutorResult<HostPlan> {
        let vars = self.host_vars(play, &host);

        let mut tasks = Vec::new();
        for (task_index, task) in play.tasks.iter().enumerate().skip(skip) {
            let effective_tags = tags::inherit(&play.tags, &task.tags);
            if !self.tag_filter.should_run(&effective_tags) {
                continue;
            }
            tasks.push(PlannedTask {
                task_index,
                name: task.name.clone(),
                tags: effective_tags,
                disposition: self.disposition(play, task, &host, &vars)?,
            });
        }

        let handlers = play
            .handlers
            .iter()
            .map(|h| self.disposition(play, &h.task, &host, &vars))
            .collect::<ExecutorResult<Vec<_>>>()?;

        Ok(HostPlan {
            host,
            vars,
            tasks,
            handlers,
        })
    }
}
