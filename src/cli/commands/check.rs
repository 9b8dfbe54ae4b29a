//! Check command - Dry-run mode
//!
//! `converge check site.yml` is `converge run --check site.yml`: every task
//! observes and plans, nothing is applied, and the recap reports predictions.

use super::{CommandContext, PlaybookArgs};
use crate::cli::commands::run::RunArgs;
use anyhow::Result;
use clap::Parser;

/// Arguments for the check command
#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub playbook: PlaybookArgs,

    /// Show differences
    #[arg(short = 'D')]
    pub diff: bool,
}

impl CheckArgs {
    /// Execute the check command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.check_mode = true;
        if self.diff {
            ctx.diff_mode = true;
            ctx.output = ctx.output.clone().with_diff_mode(true);
        }

        let run_args = RunArgs {
            playbook: self.playbook.clone(),
            step: false,
        };

        ctx.output.banner("CHECK MODE - DRY RUN");
        run_args.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_check_args_parsing() {
        let args = CheckArgs::try_parse_from(["check", "site.yml"]).unwrap();
        assert_eq!(args.playbook.playbook, PathBuf::from("site.yml"));
        assert!(!args.diff);
    }

    #[test]
    fn test_check_args_with_diff() {
        let args = CheckArgs::try_parse_from(["check", "site.yml", "-D"]).unwrap();
        assert!(args.diff);
    }
}
