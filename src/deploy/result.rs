// ABOUTME: Terminal result of one strategy run, shared by rolling and canary.
// ABOUTME: Outcome is a value; strategies never surface rollout failure as an error.

use super::DeployRequest;
use crate::types::{ContainerId, DeploymentId, TargetId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// How a deployment ended. The three failure shapes are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Succeeded,
    /// Failed, and the previous state was restored.
    RolledBack,
    /// Failed with nothing to roll back to.
    FailedNoRollback,
    /// Failed, and restoring the previous state failed too.
    RollbackFailed,
}

/// Where a failed deployment went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    Validation,
    StartContainer,
    ResolveAddress,
    HealthCheck,
    TrafficSplit,
    Promote,
    Rollback,
    Unknown,
}

/// Aggregate of one health observation window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub passed: u32,
    pub total: u32,
    pub success_rate: f64,
    pub last_error: Option<String>,
}

impl HealthSummary {
    /// Share of failed probes, from the counts so that 1 in 20 is exactly 0.05.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.total - self.passed) / f64::from(self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanaryStageResult {
    pub stage_index: usize,
    pub canary_weight: u32,
    pub prod_weight: u32,
    pub duration_seconds: u64,
    /// Cleared the error-rate threshold (or had no observation window).
    pub completed: bool,
    pub error_rate: f64,
    pub health_checks_passed: u32,
    pub health_checks_total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanaryDetail {
    pub stages_completed: usize,
    /// Canary share of the last completed stage, rounded.
    pub final_percentage: u32,
    pub stage_results: Vec<CanaryStageResult>,
    pub error_rate_at_failure: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyDetail {
    Rolling {
        health_check_result: Option<HealthSummary>,
    },
    Canary(CanaryDetail),
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub outcome: DeploymentOutcome,
    pub deployment_id: DeploymentId,
    pub image_tag: String,
    pub target_id: TargetId,
    pub container_id: Option<ContainerId>,
    pub rollback_performed: bool,
    pub error_message: Option<String>,
    pub error_phase: Option<ErrorPhase>,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub detail: StrategyDetail,
    #[serde(skip)]
    clock: Instant,
}

impl DeploymentResult {
    /// A failed result at the start of a run, filled in as phases complete.
    pub(crate) fn begin(request: &DeployRequest, image_tag: &str, detail: StrategyDetail) -> Self {
        Self {
            success: false,
            outcome: DeploymentOutcome::FailedNoRollback,
            deployment_id: request.deployment_id.clone(),
            image_tag: image_tag.to_string(),
            target_id: request.target_id.clone(),
            container_id: None,
            rollback_performed: false,
            error_message: None,
            error_phase: None,
            duration_seconds: 0.0,
            started_at: Utc::now(),
            completed_at: None,
            detail,
            clock: Instant::now(),
        }
    }

    /// Record a failure. The first failure wins; later ones (typically from
    /// rollback) are logged only.
    pub(crate) fn fail(&mut self, phase: ErrorPhase, message: impl Into<String>) {
        let message = message.into();
        if self.error_phase.is_some() {
            tracing::warn!(
                deployment = %self.deployment_id,
                ?phase,
                "additional failure: {}",
                message
            );
            return;
        }
        tracing::warn!(deployment = %self.deployment_id, ?phase, "{}", message);
        self.error_phase = Some(phase);
        self.error_message = Some(message);
    }

    pub(crate) fn finish(mut self, outcome: DeploymentOutcome) -> Self {
        self.outcome = outcome;
        self.success = outcome == DeploymentOutcome::Succeeded;
        self.rollback_performed |= matches!(
            outcome,
            DeploymentOutcome::RolledBack | DeploymentOutcome::RollbackFailed
        );
        self.completed_at = Some(Utc::now());
        self.duration_seconds = self.clock.elapsed().as_secs_f64();
        tracing::info!(
            deployment = %self.deployment_id,
            target = %self.target_id,
            ?outcome,
            duration_seconds = self.duration_seconds,
            "deployment finished"
        );
        self
    }

    pub fn canary(&self) -> Option<&CanaryDetail> {
        match &self.detail {
            StrategyDetail::Canary(detail) => Some(detail),
            StrategyDetail::Rolling { .. } => None,
        }
    }

    pub fn health_check_result(&self) -> Option<&HealthSummary> {
        match &self.detail {
            StrategyDetail::Rolling {
                health_check_result,
            } => health_check_result.as_ref(),
            StrategyDetail::Canary(_) => None,
        }
    }
}
