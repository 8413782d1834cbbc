// ABOUTME: Config loading and the check-config command.
// ABOUTME: Prints the effective settings after defaults and env overrides.

use convoy::config::Config;
use convoy::error::Result;
use convoy::output::Output;
use serde::Serialize;
use std::env;
use std::path::Path;

/// Load `path`, or discover a config in the working directory, then apply
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::discover(&env::current_dir()?)?,
    };
    Ok(config.with_env_overrides())
}

#[derive(Serialize)]
struct Summary<'a> {
    targets: Vec<&'a str>,
    store: &'a str,
    queue_prefix: &'a str,
    lock_ttl_secs: u64,
    rolling_success_threshold: f64,
    canary_error_rate_threshold: f64,
    canary_stages: Vec<String>,
}

pub fn check_config(config: &Config, output: &Output) -> Result<()> {
    let summary = Summary {
        targets: config.targets.iter().map(|t| t.id.as_str()).collect(),
        store: &config.store.url,
        queue_prefix: &config.queue.prefix,
        lock_ttl_secs: config.lock.ttl.as_secs(),
        rolling_success_threshold: config.rolling.success_threshold,
        canary_error_rate_threshold: config.canary.error_rate_threshold,
        canary_stages: config
            .canary
            .stages
            .iter()
            .map(|s| format!("{}% for {}s", s.canary_percentage(), s.duration.as_secs()))
            .collect(),
    };
    output.data("config", "Configuration is valid", &summary);
    Ok(())
}
