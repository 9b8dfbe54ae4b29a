//! Syntax-check command
//!
//! Parses the playbook and inventory, validates every module invocation and
//! expands every play against the inventory. Structural problems are
//! reported exactly as a real run would report them; no host is contacted.

use anyhow::Result;
use clap::Parser;

use super::{CommandContext, PlaybookArgs};

/// Arguments for the syntax-check command
#[derive(Parser, Debug, Clone)]
pub struct SyntaxCheckArgs {
    #[command(flatten)]
    pub playbook: PlaybookArgs,
}

impl SyntaxCheckArgs {
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let (_, graphs) = ctx.expand(&self.playbook)?;

        if ctx.output.is_json() {
            let plays: Vec<_> = graphs
                .iter()
                .map(|g| {
                    serde_json::json!({
                        "play": g.name(),
                        "hosts": g.host_names(),
                        "tasks": g.play.tasks.len(),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "valid": true, "plays": plays }))?
            );
        } else {
            println!("playbook: {}", self.playbook.playbook.display());
            for graph in &graphs {
                println!(
                    "  play '{}': {} task(s), {} host(s)",
                    graph.name(),
                    graph.play.tasks.len(),
                    graph.hosts.len()
                );
            }
            println!("Syntax OK");
        }

        Ok(0)
    }
}
