// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "convoy")]
#[command(about = "Queue-driven rolling and canary container rollouts with automatic rollback")]
#[command(version)]
pub struct Cli {
    /// Path to convoy.yml (default: discovered in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit JSON lines instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Only print final results
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a convoy.yml configuration file
    Init {
        /// First target, as [user@]host[:port]
        #[arg(long)]
        target: Option<String>,

        /// Coordination store URL (memory:// or redis://...)
        #[arg(long)]
        store: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and print the effective settings
    CheckConfig,

    /// Add a deployment job to the queue
    Enqueue {
        #[arg(long)]
        repository: String,

        #[arg(long, default_value = "main")]
        branch: String,

        #[arg(long)]
        commit: String,

        #[arg(long, default_value = "cli")]
        triggered_by: String,

        #[arg(long, default_value_t = 0)]
        priority: i32,

        #[arg(long)]
        strategy: Option<String>,

        #[command(flatten)]
        deployment: JobArgs,
    },

    /// Deploy an image now, bypassing the queue
    Deploy {
        #[arg(long, default_value = "rolling")]
        strategy: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Roll a target back (rolling: redeploy --previous-image; canary: production-only traffic)
    Rollback {
        #[arg(long, default_value = "rolling")]
        strategy: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Process queued jobs until interrupted
    Worker {
        /// Number of concurrent workers in this process
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },

    /// Requeue jobs abandoned by crashed workers until interrupted
    Watchdog {
        /// Sweep once and exit
        #[arg(long)]
        once: bool,
    },

    /// Show queue depths
    Stats {
        /// Also show up to N dead-lettered payloads
        #[arg(long, value_name = "N")]
        dead_letter: Option<usize>,
    },
}

/// Deployment parameters carried in job metadata.
#[derive(Args)]
pub struct JobArgs {
    #[arg(long)]
    pub target: String,

    #[arg(long)]
    pub port: u16,

    /// Image to deploy (default: <repo-name>:<short commit>)
    #[arg(long)]
    pub image: Option<String>,

    #[arg(long)]
    pub container_name: Option<String>,

    #[arg(long)]
    pub health_path: Option<String>,

    #[arg(long)]
    pub previous_image: Option<String>,

    /// Container environment, KEY=VALUE (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

/// A fully specified deployment request.
#[derive(Args)]
pub struct RequestArgs {
    #[arg(long)]
    pub target: String,

    #[arg(long)]
    pub image: String,

    #[arg(long)]
    pub container_name: String,

    #[arg(long)]
    pub port: u16,

    #[arg(long, default_value = "/health")]
    pub health_path: String,

    #[arg(long)]
    pub previous_image: Option<String>,

    /// Deployment id (default: generated)
    #[arg(long)]
    pub id: Option<String>,

    /// Container environment, KEY=VALUE (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}
