// ABOUTME: Entry point for the convoy CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::JobSpec;
use convoy::config;
use convoy::error::Result;
use convoy::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(OutputMode::from_flags(cli.json, cli.quiet));

    if let Err(e) = run(cli, output.clone()).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    if let Commands::Init {
        target,
        store,
        force,
    } = &cli.command
    {
        let cwd = env::current_dir()?;
        config::init_config(&cwd, target.as_deref(), store.as_deref(), *force)?;
        output.success(&format!("Created {}", config::CONFIG_FILENAME));
        return Ok(());
    }

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::CheckConfig => commands::check_config(&config, &output),
        Commands::Enqueue {
            repository,
            branch,
            commit,
            triggered_by,
            priority,
            strategy,
            deployment,
        } => {
            let spec = JobSpec {
                repository,
                branch,
                commit,
                triggered_by,
                priority,
                strategy,
                deployment,
            };
            commands::enqueue(&config, spec, &output).await
        }
        Commands::Deploy { strategy, request } => {
            commands::deploy(&config, &strategy, request, output).await
        }
        Commands::Rollback { strategy, request } => {
            commands::rollback(&config, &strategy, request, output).await
        }
        Commands::Worker { workers } => commands::worker(&config, workers, &output).await,
        Commands::Watchdog { once } => commands::watchdog(&config, once, &output).await,
        Commands::Stats { dead_letter } => commands::stats(&config, dead_letter, &output).await,
    }
}
