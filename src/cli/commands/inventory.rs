//! Inventory commands - List hosts and tasks
//!
//! This module implements the `list-hosts` and `list-tasks` subcommands.
//! Neither contacts a host.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{CommandContext, PlaybookArgs};
use converge::error::Error;
use converge::executor::Disposition;
use converge::inventory::HostSelector;

/// Arguments for list-hosts command
#[derive(Parser, Debug, Clone)]
pub struct ListHostsArgs {
    /// Host selector to resolve
    #[arg(default_value = "all")]
    pub pattern: String,

    /// Show each host's resolved variables and where they came from
    #[arg(long)]
    pub vars: bool,
}

/// Arguments for list-tasks command
#[derive(Parser, Debug, Clone)]
pub struct ListTasksArgs {
    #[command(flatten)]
    pub playbook: PlaybookArgs,
}

#[derive(Debug, Serialize)]
struct HostListing {
    name: String,
    groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vars: Option<serde_json::Map<String, JsonValue>>,
}

#[derive(Debug, Serialize)]
struct TaskListing<'a> {
    name: &'a str,
    tags: &'a [String],
    #[serde(flatten)]
    disposition: &'a Disposition,
}

impl ListHostsArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let inventory = ctx.load_inventory()?;
        let mut hosts = HostSelector::parse(&self.pattern)
            .and_then(|s| s.select(&inventory))
            .map_err(Error::from)?;

        if let Some(limit) = ctx.limit_selector()? {
            let allowed = limit.select(&inventory).map_err(Error::from)?;
            hosts.retain(|h| allowed.iter().any(|a| a.name == h.name));
        }

        let listing: Vec<HostListing> = hosts
            .iter()
            .map(|host| HostListing {
                name: host.name.clone(),
                groups: host.groups.iter().cloned().collect(),
                vars: self.vars.then(|| {
                    inventory
                        .host_vars(&host.name)
                        .unwrap_or_default()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                }),
            })
            .collect();

        if ctx.output.is_json() {
            println!("{}", serde_json::to_string_pretty(&listing)?);
            return Ok(0);
        }

        println!("  hosts ({}):", listing.len());
        for host in &listing {
            println!("    {}", host.name);
            if let Some(vars) = &host.vars {
                let resolved = inventory.host_vars(&host.name).unwrap_or_default();
                for (key, value) in vars {
                    let origin = resolved
                        .origin(key)
                        .map(|o| format!("{} '{}'", o.precedence, o.source))
                        .unwrap_or_default();
                    println!("      {} = {}    ({})", key, value, origin);
                }
            }
        }
        Ok(0)
    }
}

impl ListTasksArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let (_, graphs) = ctx.expand(&self.playbook)?;

        if ctx.output.is_json() {
            let plays: Vec<JsonValue> = graphs
                .iter()
                .map(|graph| {
                    let hosts: serde_json::Map<String, JsonValue> = graph
                        .hosts
                        .iter()
                        .map(|plan| {
                            let tasks: Vec<TaskListing<'_>> = plan
                                .tasks
                                .iter()
                                .map(|t| TaskListing {
                                    name: &t.name,
                                    tags: &t.tags,
                                    disposition: &t.disposition,
                                })
                                .collect();
                            (plan.host.clone(), serde_json::json!(tasks))
                        })
                        .collect();
                    serde_json::json!({ "play": graph.name(), "hosts": hosts })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&plays)?);
            return Ok(0);
        }

        println!("playbook: {}", self.playbook.playbook.display());
        for (idx, graph) in graphs.iter().enumerate() {
            println!(
                "\n  play #{} ({}): {}",
                idx + 1,
                graph.play.hosts,
                graph.name()
            );
            for plan in &graph.hosts {
                println!("    host {}:", plan.host);
                for task in &plan.tasks {
                    let tags = if task.tags.is_empty() {
                        String::new()
                    } else {
                        format!("    TAGS: [{}]", task.tags.join(", "))
                    };
                    match &task.disposition {
                        Disposition::Run => println!("      {}{}", task.name, tags),
                        Disposition::Skip { reason } => {
                            println!("      {}{}    (skipped: {})", task.name, tags, reason)
                        }
                    }
                }
            }
        }
        Ok(0)
    }
}
