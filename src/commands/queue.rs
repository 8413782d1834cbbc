// ABOUTME: Enqueue and stats commands.
// ABOUTME: Deployment parameters travel as job metadata for the worker to read.

use super::{ensure_target, parse_env, warn_if_ephemeral};
use crate::cli::JobArgs;
use convoy::config::Config;
use convoy::error::Result;
use convoy::orchestrator::Orchestrator;
use convoy::output::Output;
use convoy::queue::DeploymentJob;
use serde::Serialize;

/// Job identity plus the deployment settings, as given on the command line.
pub struct JobSpec {
    pub repository: String,
    pub branch: String,
    pub commit: String,
    pub triggered_by: String,
    pub priority: i32,
    pub strategy: Option<String>,
    pub deployment: JobArgs,
}

fn job(spec: JobSpec) -> Result<DeploymentJob> {
    let args = spec.deployment;
    let mut job = DeploymentJob::new(spec.repository, spec.branch, spec.commit, spec.triggered_by)
        .with_priority(spec.priority)
        .with_metadata("target_id", args.target)
        .with_metadata("port", args.port.to_string());

    let optional = [
        ("strategy", spec.strategy),
        ("image_tag", args.image),
        ("container_name", args.container_name),
        ("health_check_path", args.health_path),
        ("previous_image_tag", args.previous_image),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            job = job.with_metadata(key, value);
        }
    }
    for (key, value) in parse_env(&args.env)? {
        job = job.with_metadata(format!("env.{key}"), value);
    }
    Ok(job)
}

#[derive(Serialize)]
struct Enqueued<'a> {
    job_id: &'a str,
}

pub async fn enqueue(config: &Config, spec: JobSpec, output: &Output) -> Result<()> {
    ensure_target(config, &spec.deployment.target)?;
    warn_if_ephemeral(config);
    let job = job(spec)?;

    let orchestrator = Orchestrator::from_config(config).await?;
    let job_id = orchestrator.enqueue_deployment(job).await?;
    output.data(
        "enqueued",
        &format!("Enqueued job {job_id}"),
        &Enqueued { job_id: &job_id },
    );
    Ok(())
}

pub async fn stats(config: &Config, dead_letter: Option<usize>, output: &Output) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;
    let stats = orchestrator.queue_stats().await?;
    output.data("stats", "Queue depths", &stats);

    if let Some(limit) = dead_letter {
        let payloads = orchestrator.queue().peek_dead_letter(limit).await?;
        output.data("dead_letter", "Dead-lettered jobs (newest first)", &payloads);
    }
    Ok(())
}
