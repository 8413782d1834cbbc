// ABOUTME: Rolling update: replace the container in place, observe, then keep or roll back.
// ABOUTME: START → DEPLOY_NEW → OBSERVE → PROMOTE | ROLLBACK → DONE.

use super::observe::observe;
use super::{
    DeployRequest, DeploymentOutcome, DeploymentResult, ErrorPhase, StrategyDetail, Validated,
};
use crate::config::RollingConfig;
use crate::health::HealthProber;
use crate::target::{StartContainer, TargetController};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[derive(Clone)]
pub struct RollingDeployer {
    controller: Arc<dyn TargetController>,
    prober: Arc<dyn HealthProber>,
    config: RollingConfig,
}

impl std::fmt::Debug for RollingDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingDeployer")
            .field("config", &self.config)
            .finish()
    }
}

impl RollingDeployer {
    pub fn new(
        controller: Arc<dyn TargetController>,
        prober: Arc<dyn HealthProber>,
        config: RollingConfig,
    ) -> Self {
        Self {
            controller,
            prober,
            config,
        }
    }

    /// Start `image_tag` in place of the running container and keep it only
    /// if enough probes pass during the observation window.
    pub async fn deploy(&self, request: &DeployRequest) -> DeploymentResult {
        let mut result = DeploymentResult::begin(
            request,
            &request.image_tag,
            StrategyDetail::Rolling {
                health_check_result: None,
            },
        );

        let validated = match request.validate() {
            Ok(v) => v,
            Err(e) => {
                result.fail(ErrorPhase::Validation, e.to_string());
                return result.finish(DeploymentOutcome::FailedNoRollback);
            }
        };

        tracing::info!(
            deployment = %request.deployment_id,
            target = %request.target_id,
            image = %validated.image,
            "rolling deployment started"
        );

        let run = AssertUnwindSafe(self.run(request, &validated, &mut result)).catch_unwind();
        let outcome = match run.await {
            Ok(outcome) => outcome,
            Err(_) => {
                result.fail(ErrorPhase::Unknown, "rolling deployment panicked");
                // The new container exists once its id is recorded.
                if result.container_id.is_some() {
                    self.roll_back(request, &validated, &mut result).await
                } else {
                    DeploymentOutcome::FailedNoRollback
                }
            }
        };
        result.finish(outcome)
    }

    async fn run(
        &self,
        request: &DeployRequest,
        validated: &Validated,
        result: &mut DeploymentResult,
    ) -> DeploymentOutcome {
        let start = StartContainer {
            image: validated.image.clone(),
            name: validated.container_name.clone(),
            port: request.port,
            env: request.env.clone(),
            stop_existing: true,
        };

        match self
            .controller
            .start_container(&request.target_id, &start)
            .await
        {
            Ok(id) => result.container_id = Some(id),
            Err(e) => {
                result.fail(ErrorPhase::StartContainer, e.to_string());
                return DeploymentOutcome::FailedNoRollback;
            }
        }

        if !self.config.startup_grace.is_zero() {
            tokio::time::sleep(self.config.startup_grace).await;
        }

        let address = match self.controller.resolve_address(&request.target_id).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                result.fail(
                    ErrorPhase::ResolveAddress,
                    format!("target {} has no reachable address", request.target_id),
                );
                return self.roll_back(request, validated, result).await;
            }
            Err(e) => {
                result.fail(ErrorPhase::ResolveAddress, e.to_string());
                return self.roll_back(request, validated, result).await;
            }
        };

        let url = format!(
            "http://{}:{}{}",
            address, request.port, request.health_check_path
        );
        let summary = observe(
            self.prober.as_ref(),
            &url,
            self.config.check_duration,
            self.config.check_interval,
        )
        .await;

        let healthy = summary.success_rate >= self.config.success_threshold;
        let message = format!(
            "{}/{} health checks passed ({:.0}% < {:.0}% required)",
            summary.passed,
            summary.total,
            summary.success_rate * 100.0,
            self.config.success_threshold * 100.0
        );
        result.detail = StrategyDetail::Rolling {
            health_check_result: Some(summary),
        };

        if healthy {
            tracing::info!(deployment = %request.deployment_id, "new container is healthy");
            return DeploymentOutcome::Succeeded;
        }

        result.fail(ErrorPhase::HealthCheck, message);
        self.roll_back(request, validated, result).await
    }

    /// Stop the new container and, if there is one, bring back the previous
    /// image under the same name.
    async fn roll_back(
        &self,
        request: &DeployRequest,
        validated: &Validated,
        result: &mut DeploymentResult,
    ) -> DeploymentOutcome {
        if let Err(e) = self
            .controller
            .stop_container(&request.target_id, &validated.container_name, true)
            .await
        {
            result.fail(
                ErrorPhase::Rollback,
                format!("failed to stop new container: {e}"),
            );
        }

        let Some(previous) = &validated.previous_image else {
            tracing::warn!(
                deployment = %request.deployment_id,
                "no previous image; leaving target without a replacement"
            );
            return DeploymentOutcome::FailedNoRollback;
        };

        tracing::warn!(
            deployment = %request.deployment_id,
            previous = %previous,
            "rolling back"
        );
        let restore = StartContainer {
            image: previous.clone(),
            name: validated.container_name.clone(),
            port: request.port,
            env: request.env.clone(),
            stop_existing: true,
        };
        match self
            .controller
            .start_container(&request.target_id, &restore)
            .await
        {
            Ok(id) => {
                result.container_id = Some(id);
                DeploymentOutcome::RolledBack
            }
            Err(e) => {
                result.fail(
                    ErrorPhase::Rollback,
                    format!("failed to restore {previous}: {e}"),
                );
                DeploymentOutcome::RollbackFailed
            }
        }
    }

    /// Redeploy `previous_image_tag` under the request's container name.
    pub async fn rollback(&self, request: &DeployRequest) -> DeploymentResult {
        let image_tag = request.previous_image_tag.clone().unwrap_or_default();
        let mut result = DeploymentResult::begin(
            request,
            &image_tag,
            StrategyDetail::Rolling {
                health_check_result: None,
            },
        );

        let validated = match request.validate() {
            Ok(v) => v,
            Err(e) => {
                result.fail(ErrorPhase::Validation, e.to_string());
                return result.finish(DeploymentOutcome::FailedNoRollback);
            }
        };
        let Some(previous) = validated.previous_image else {
            result.fail(
                ErrorPhase::Validation,
                "previous_image_tag is required for rollback",
            );
            return result.finish(DeploymentOutcome::FailedNoRollback);
        };

        let restore = StartContainer {
            image: previous,
            name: validated.container_name,
            port: request.port,
            env: request.env.clone(),
            stop_existing: true,
        };
        match self
            .controller
            .start_container(&request.target_id, &restore)
            .await
        {
            Ok(id) => {
                result.container_id = Some(id);
                result.rollback_performed = true;
                result.finish(DeploymentOutcome::Succeeded)
            }
            Err(e) => {
                result.fail(ErrorPhase::Rollback, e.to_string());
                result.finish(DeploymentOutcome::RollbackFailed)
            }
        }
    }
}
