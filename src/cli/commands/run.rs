//! Run command - Execute a playbook
//!
//! This module implements the `run` subcommand.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use super::{CommandContext, PlaybookArgs};
use crate::cli::output::ConsoleCallback;
use converge::error::Error;
use converge::executor::{Executor, PromptGate};

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub playbook: PlaybookArgs,

    /// Confirm each task before it runs
    #[arg(long)]
    pub step: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let path = &self.playbook.playbook;
        ctx.output.banner(&format!(
            "PLAYBOOK: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));

        let inventory = Arc::new(ctx.load_inventory()?);
        let playbook = ctx.load_playbook(path)?;
        let mut config = ctx.executor_config(&self.playbook)?;
        config.step = self.step;

        if ctx.check_mode {
            ctx.output
                .warning("Running in CHECK MODE - no changes will be made");
        }

        let mut executor = Executor::new(inventory, config)
            .with_callback(Arc::new(ConsoleCallback::new(ctx.output.clone())))
            .with_cancellation_token(ctx.cancel.clone());
        if self.step {
            executor = executor.with_step_gate(Arc::new(PromptGate::new()));
        }

        let report = executor.run(&playbook).await.map_err(Error::from)?;
        info!(run_id = %report.run_id, "Run complete");

        ctx.output.recap(&report);
        ctx.output.report_json(&report)?;

        Ok(report.exit_status().code())
    }
}
