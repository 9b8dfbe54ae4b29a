//! converge - declarative configuration orchestration
//!
//! This is the main entry point for the converge CLI.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use converge::config::Config;
use converge::error::Error;
use converge::report::ExitStatus;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbosity());

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight tasks");
            eprintln!("\nInterrupted: waiting for running tasks to finish...");
            signal_token.cancel();
        }
    });

    let mut ctx = CommandContext::new(&cli, config, cancel);

    match &cli.command {
        Commands::Run(args) => args.execute(&mut ctx).await,
        Commands::Check(args) => args.execute(&mut ctx).await,
        Commands::SyntaxCheck(args) => args.execute(&mut ctx).await,
        Commands::ListHosts(args) => args.execute(&mut ctx).await,
        Commands::ListTasks(args) => args.execute(&mut ctx).await,
    }
}

/// Map a run-level error to the process exit status
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>()
        .map(Error::exit_code)
        .unwrap_or(ExitStatus::InternalError.code())
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity >= 3),
        )
        .with(env_filter)
        .init();
}
