// ABOUTME: Strategy selection: a fixed table from strategy name to deployer constructor.
// ABOUTME: Deployers form a closed set behind one deploy/rollback interface.

use super::{
    CanaryDeployer, CanaryDetail, DeployError, DeployRequest, DeploymentOutcome,
    DeploymentResult, ErrorPhase, RollingDeployer, StrategyDetail,
};
use crate::config::{CanaryConfig, RollingConfig};
use crate::health::HealthProber;
use crate::target::TargetController;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Rollout strategy names accepted by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Rolling,
    Canary,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Rolling => "rolling",
            StrategyKind::Canary => "canary",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Deployer {
    Rolling(RollingDeployer),
    Canary(CanaryDeployer),
}

impl Deployer {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Deployer::Rolling(_) => StrategyKind::Rolling,
            Deployer::Canary(_) => StrategyKind::Canary,
        }
    }

    pub async fn deploy(&self, request: &DeployRequest) -> DeploymentResult {
        match self {
            Deployer::Rolling(rolling) => rolling.deploy(request).await,
            Deployer::Canary(canary) => canary.deploy(request).await,
        }
    }

    /// Rolling: redeploy `previous_image_tag`. Canary: emergency rollback to
    /// production-only traffic with the canary stopped.
    pub async fn rollback(&self, request: &DeployRequest) -> DeploymentResult {
        match self {
            Deployer::Rolling(rolling) => rolling.rollback(request).await,
            Deployer::Canary(canary) => canary_rollback(canary, request).await,
        }
    }
}

async fn canary_rollback(canary: &CanaryDeployer, request: &DeployRequest) -> DeploymentResult {
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

    if canary
        .rollback(&request.target_id, &validated.container_name, request.port)
        .await
    {
        result.rollback_performed = true;
        result.finish(DeploymentOutcome::Succeeded)
    } else {
        result.fail(
            ErrorPhase::Rollback,
            "emergency canary rollback did not complete",
        );
        result.finish(DeploymentOutcome::RollbackFailed)
    }
}

/// Collaborators and settings every deployer is built from.
#[derive(Clone)]
pub struct StrategyContext {
    pub controller: Arc<dyn TargetController>,
    pub prober: Arc<dyn HealthProber>,
    pub rolling: RollingConfig,
    pub canary: CanaryConfig,
}

type Constructor = fn(&StrategyContext) -> Deployer;

fn rolling(ctx: &StrategyContext) -> Deployer {
    Deployer::Rolling(RollingDeployer::new(
        ctx.controller.clone(),
        ctx.prober.clone(),
        ctx.rolling.clone(),
    ))
}

fn canary(ctx: &StrategyContext) -> Deployer {
    Deployer::Canary(CanaryDeployer::new(
        ctx.controller.clone(),
        ctx.prober.clone(),
        ctx.canary.clone(),
    ))
}

const STRATEGIES: &[(&str, Constructor)] = &[("rolling", rolling), ("canary", canary)];

/// Builds deployers by name.
#[derive(Clone)]
pub struct StrategySelector {
    context: StrategyContext,
}

impl fmt::Debug for StrategySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategySelector")
            .field("strategies", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl StrategySelector {
    pub fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    /// Look up `name` (case-insensitive, surrounding whitespace ignored).
    pub fn select(&self, name: &str) -> Result<Deployer, DeployError> {
        let wanted = name.trim().to_ascii_lowercase();
        STRATEGIES
            .iter()
            .find(|(known, _)| *known == wanted)
            .map(|(_, build)| build(&self.context))
            .ok_or_else(|| DeployError::UnknownStrategy {
                name: name.to_string(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        STRATEGIES.iter().map(|(name, _)| *name)
    }
}
