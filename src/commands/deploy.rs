// ABOUTME: Direct deploy and rollback commands, run outside the queue.
// ABOUTME: Both hold the target lock and exit non-zero unless the rollout succeeded.

use super::{ensure_target, parse_env};
use crate::cli::RequestArgs;
use convoy::config::Config;
use convoy::deploy::{DeployRequest, DeploymentResult};
use convoy::error::{Error, Result};
use convoy::orchestrator::Orchestrator;
use convoy::output::Output;

fn request(args: RequestArgs) -> Result<DeployRequest> {
    let env = parse_env(&args.env)?;
    let mut request = DeployRequest::new(args.target, args.image, args.container_name, args.port)
        .with_health_check_path(args.health_path);
    if let Some(id) = args.id {
        request = request.with_deployment_id(id);
    }
    if let Some(previous) = args.previous_image {
        request = request.with_previous_image(previous);
    }
    request.env = env;
    Ok(request)
}

fn finish(result: DeploymentResult, output: &Output) -> Result<()> {
    output.deployment(&result);
    if result.success {
        Ok(())
    } else {
        Err(Error::DeploymentFailed(result.deployment_id.to_string()))
    }
}

pub async fn deploy(
    config: &Config,
    strategy: &str,
    args: RequestArgs,
    mut output: Output,
) -> Result<()> {
    ensure_target(config, &args.target)?;
    let request = request(args)?;
    let orchestrator = Orchestrator::from_config(config).await?;

    output.start_timer();
    output.progress(&format!(
        "Deploying {} to {} ({})",
        request.image_tag, request.target_id, strategy
    ));
    let result = orchestrator.deploy(strategy, &request).await?;
    finish(result, &output)
}

pub async fn rollback(
    config: &Config,
    strategy: &str,
    args: RequestArgs,
    mut output: Output,
) -> Result<()> {
    ensure_target(config, &args.target)?;
    let request = request(args)?;
    let orchestrator = Orchestrator::from_config(config).await?;

    output.start_timer();
    output.progress(&format!(
        "Rolling back {} on {} ({})",
        request.container_name, request.target_id, strategy
    ));
    let result = orchestrator.rollback(strategy, &request).await?;
    finish(result, &output)
}
