// ABOUTME: Command module aggregator for the convoy CLI.
// ABOUTME: Re-exports config, deploy, queue, and worker command handlers.

mod config;
mod deploy;
mod queue;
mod worker;

pub use config::{check_config, load_config};
pub use deploy::{deploy, rollback};
pub use queue::{JobSpec, enqueue, stats};
pub use worker::{watchdog, worker};

use convoy::config::Config;
use convoy::error::{Error, Result};
use std::collections::BTreeMap;

/// Parse repeated `KEY=VALUE` arguments.
fn parse_env(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(Error::InvalidArgument(format!(
                "expected KEY=VALUE, got '{pair}'"
            ))),
        })
        .collect()
}

fn ensure_target(config: &Config, target: &str) -> Result<()> {
    config
        .target(target)
        .map(|_| ())
        .ok_or_else(|| Error::UnknownTarget(target.to_string()))
}

fn warn_if_ephemeral(config: &Config) {
    if config.store.url.starts_with("memory://") {
        tracing::warn!("memory:// store is private to this process; use redis:// to share the queue");
    }
}
