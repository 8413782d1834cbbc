// ABOUTME: Staged canary rollout gated by the canary's observed error rate.
// ABOUTME: START → STAGE[0..2] → PROMOTE | ROLLBACK, with best-effort rollback on any failure.

use super::observe::observe;
use super::traffic::TrafficSplit;
use super::{
    CanaryDetail, CanaryStageResult, DeployRequest, DeploymentOutcome, DeploymentResult,
    ErrorPhase, StrategyDetail, Validated,
};
use crate::config::{CanaryConfig, CanaryStage};
use crate::health::HealthProber;
use crate::target::{StartContainer, TargetController};
use crate::types::{ContainerName, TargetId};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[derive(Clone)]
pub struct CanaryDeployer {
    controller: Arc<dyn TargetController>,
    prober: Arc<dyn HealthProber>,
    config: CanaryConfig,
}

impl std::fmt::Debug for CanaryDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanaryDeployer")
            .field("config", &self.config)
            .finish()
    }
}

/// Mutable state of one run, kept outside the run future so a panic does
/// not lose it.
struct CanaryRun {
    detail: CanaryDetail,
    canary_started: bool,
    traffic_shifted: bool,
}

/// Why a run stopped early.
struct Abort {
    phase: ErrorPhase,
    message: String,
    /// Also restore the previous production image.
    restore_production: bool,
}

impl Abort {
    fn new(phase: ErrorPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            restore_production: false,
        }
    }
}

impl CanaryDeployer {
    pub fn new(
        controller: Arc<dyn TargetController>,
        prober: Arc<dyn HealthProber>,
        config: CanaryConfig,
    ) -> Self {
        Self {
            controller,
            prober,
            config,
        }
    }

    fn traffic(&self, request: &DeployRequest, name: &ContainerName) -> TrafficSplit {
        TrafficSplit::new(
            &self.config.proxy,
            name.as_str(),
            request.port,
            self.config.canary_port,
        )
    }

    pub async fn deploy(&self, request: &DeployRequest) -> DeploymentResult {
        let mut result = DeploymentResult::begin(
            request,
            &request.image_tag,
            StrategyDetail::Canary(CanaryDetail::default()),
        );

        let validated = match request.validate() {
            Ok(v) => v,
            Err(e) => {
                result.fail(ErrorPhase::Validation, e.to_string());
                return result.finish(DeploymentOutcome::FailedNoRollback);
            }
        };
        if request.port == self.config.canary_port {
            result.fail(
                ErrorPhase::Validation,
                format!(
                    "port {} is reserved for the canary container",
                    self.config.canary_port
                ),
            );
            return result.finish(DeploymentOutcome::FailedNoRollback);
        }

        tracing::info!(
            deployment = %request.deployment_id,
            target = %request.target_id,
            image = %validated.image,
            "canary deployment started"
        );

        let mut run = CanaryRun {
            detail: CanaryDetail::default(),
            canary_started: false,
            traffic_shifted: false,
        };

        let stages = AssertUnwindSafe(self.run(request, &validated, &mut result, &mut run))
            .catch_unwind()
            .await;
        let abort = match stages {
            Ok(Ok(())) => None,
            Ok(Err(abort)) => Some(abort),
            Err(_) => Some(Abort::new(ErrorPhase::Unknown, "canary deployment panicked")),
        };

        let outcome = match abort {
            None => DeploymentOutcome::Succeeded,
            Some(abort) => {
                result.fail(abort.phase, abort.message);
                if run.canary_started {
                    let restored = self
                        .roll_back_run(
                            request,
                            &validated,
                            &run,
                            abort.restore_production,
                            &mut result,
                        )
                        .await;
                    if restored {
                        DeploymentOutcome::RolledBack
                    } else {
                        DeploymentOutcome::RollbackFailed
                    }
                } else {
                    DeploymentOutcome::FailedNoRollback
                }
            }
        };

        result.detail = StrategyDetail::Canary(run.detail);
        result.finish(outcome)
    }

    async fn run(
        &self,
        request: &DeployRequest,
        validated: &Validated,
        result: &mut DeploymentResult,
        run: &mut CanaryRun,
    ) -> Result<(), Abort> {
        let target = &request.target_id;
        let prod_name = &validated.container_name;
        let canary_name = prod_name.canary();
        let traffic = self.traffic(request, prod_name);

        let canary = StartContainer {
            image: validated.image.clone(),
            name: canary_name.clone(),
            port: self.config.canary_port,
            env: request.env.clone(),
            stop_existing: true,
        };
        let canary_id = self
            .controller
            .start_container(target, &canary)
            .await
            .map_err(|e| Abort::new(ErrorPhase::StartContainer, e.to_string()))?;
        run.canary_started = true;
        result.container_id = Some(canary_id);

        let address = self
            .controller
            .resolve_address(target)
            .await
            .map_err(|e| Abort::new(ErrorPhase::ResolveAddress, e.to_string()))?
            .ok_or_else(|| {
                Abort::new(
                    ErrorPhase::ResolveAddress,
                    format!("target {target} has no reachable address"),
                )
            })?;
        let url = format!(
            "http://{}:{}{}",
            address, self.config.canary_port, request.health_check_path
        );

        for (index, stage) in self.config.stages.iter().enumerate() {
            run.traffic_shifted = true;
            self.apply(target, &traffic.apply_command(&traffic.render_stage(stage)))
                .await
                .map_err(|e| Abort::new(ErrorPhase::TrafficSplit, e))?;
            tracing::info!(
                deployment = %request.deployment_id,
                stage = index,
                canary_percentage = stage.canary_percentage(),
                "traffic shifted to canary"
            );

            let stage_result = self.observe_stage(index, stage, &url).await;
            let completed = stage_result.completed;
            let error_rate = stage_result.error_rate;
            run.detail.stage_results.push(stage_result);

            if !completed {
                run.detail.error_rate_at_failure = Some(error_rate);
                return Err(Abort::new(
                    ErrorPhase::HealthCheck,
                    format!(
                        "stage {} error rate {:.1}% exceeds {:.1}%",
                        index,
                        error_rate * 100.0,
                        self.config.error_rate_threshold * 100.0
                    ),
                ));
            }
            run.detail.stages_completed += 1;
            run.detail.final_percentage = stage.canary_percentage();
        }

        self.promote(request, validated, &traffic, &canary_name, result)
            .await
    }

    async fn observe_stage(
        &self,
        index: usize,
        stage: &CanaryStage,
        url: &str,
    ) -> CanaryStageResult {
        let mut stage_result = CanaryStageResult {
            stage_index: index,
            canary_weight: stage.canary_weight,
            prod_weight: stage.prod_weight,
            duration_seconds: stage.duration.as_secs(),
            completed: true,
            error_rate: 0.0,
            health_checks_passed: 0,
            health_checks_total: 0,
        };
        if stage.duration.is_zero() {
            return stage_result;
        }

        let summary = observe(
            self.prober.as_ref(),
            url,
            stage.duration,
            self.config.check_interval,
        )
        .await;
        stage_result.error_rate = summary.error_rate();
        stage_result.completed = stage_result.error_rate <= self.config.error_rate_threshold;
        stage_result.health_checks_passed = summary.passed;
        stage_result.health_checks_total = summary.total;
        stage_result
    }

    /// Replace production with the canary's image, restore the single
    /// upstream, and retire the canary.
    async fn promote(
        &self,
        request: &DeployRequest,
        validated: &Validated,
        traffic: &TrafficSplit,
        canary_name: &ContainerName,
        result: &mut DeploymentResult,
    ) -> Result<(), Abort> {
        let target = &request.target_id;
        let promote_failed = |message: String| Abort {
            phase: ErrorPhase::Promote,
            message,
            restore_production: true,
        };

        self.controller
            .stop_container(target, &validated.container_name, false)
            .await
            .map_err(|e| {
                Abort::new(
                    ErrorPhase::Promote,
                    format!("failed to stop production: {e}"),
                )
            })?;

        let production = StartContainer {
            image: validated.image.clone(),
            name: validated.container_name.clone(),
            port: request.port,
            env: request.env.clone(),
            stop_existing: true,
        };
        let id = self
            .controller
            .start_container(target, &production)
            .await
            .map_err(|e| promote_failed(format!("failed to start promoted image: {e}")))?;
        result.container_id = Some(id);

        self.apply(target, &traffic.apply_command(&traffic.render_single()))
            .await
            .map_err(promote_failed)?;

        if let Err(e) = self.controller.stop_container(target, canary_name, true).await {
            tracing::warn!(container = %canary_name, "failed to stop canary after promotion: {}", e);
        }

        tracing::info!(deployment = %request.deployment_id, "canary promoted");
        Ok(())
    }

    /// Run a proxy update; a non-zero exit is a failure.
    async fn apply(&self, target: &TargetId, command: &str) -> Result<(), String> {
        let output = self
            .controller
            .run_command(target, command)
            .await
            .map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(format!(
                "proxy update exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            ));
        }
        Ok(())
    }

    /// Best-effort rollback after an aborted run. Returns whether every step
    /// succeeded; failures are recorded but never replace the original error.
    async fn roll_back_run(
        &self,
        request: &DeployRequest,
        validated: &Validated,
        run: &CanaryRun,
        restore_production: bool,
        result: &mut DeploymentResult,
    ) -> bool {
        let target = &request.target_id;
        let mut restored = true;

        if run.traffic_shifted || restore_production {
            let traffic = self.traffic(request, &validated.container_name);
            if let Err(e) = self
                .apply(target, &traffic.apply_command(&traffic.render_single()))
                .await
            {
                result.fail(ErrorPhase::Rollback, format!("failed to revert traffic: {e}"));
                restored = false;
            }
        }

        if let Err(e) = self
            .controller
            .stop_container(target, &validated.container_name.canary(), true)
            .await
        {
            result.fail(ErrorPhase::Rollback, format!("failed to stop canary: {e}"));
            restored = false;
        }

        if restore_production && let Some(previous) = &validated.previous_image {
            let production = StartContainer {
                image: previous.clone(),
                name: validated.container_name.clone(),
                port: request.port,
                env: request.env.clone(),
                stop_existing: true,
            };
            match self.controller.start_container(target, &production).await {
                Ok(id) => result.container_id = Some(id),
                Err(e) => {
                    result.fail(
                        ErrorPhase::Rollback,
                        format!("failed to restore {previous}: {e}"),
                    );
                    restored = false;
                }
            }
        } else if restore_production {
            tracing::warn!(
                deployment = %request.deployment_id,
                "production was replaced and no previous image is known"
            );
            restored = false;
        }

        tracing::warn!(
            deployment = %request.deployment_id,
            restored,
            "canary rolled back"
        );
        restored
    }

    /// Emergency rollback: production-only traffic and no canary. Safe to
    /// repeat; failures are logged and reported as `false`.
    pub async fn rollback(
        &self,
        target: &TargetId,
        container_name: &ContainerName,
        prod_port: u16,
    ) -> bool {
        let traffic = TrafficSplit::new(
            &self.config.proxy,
            container_name.as_str(),
            prod_port,
            self.config.canary_port,
        );
        let mut ok = true;

        if let Err(e) = self
            .apply(target, &traffic.apply_command(&traffic.render_single()))
            .await
        {
            tracing::warn!(target = %target, "failed to revert traffic: {}", e);
            ok = false;
        }
        if let Err(e) = self
            .controller
            .stop_container(target, &container_name.canary(), true)
            .await
        {
            tracing::warn!(target = %target, "failed to stop canary: {}", e);
            ok = false;
        }
        ok
    }
}
