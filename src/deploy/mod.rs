// ABOUTME: Deployment strategies (rolling, canary) and the selector that builds them.
// ABOUTME: Every strategy run ends in a DeploymentResult, never an error.

mod canary;
mod error;
mod observe;
mod request;
mod result;
mod rolling;
mod strategy;
mod traffic;

pub use canary::CanaryDeployer;
pub use error::DeployError;
pub use request::{DeployRequest, Validated, ValidationError};
pub use result::{
    CanaryDetail, CanaryStageResult, DeploymentOutcome, DeploymentResult, ErrorPhase,
    HealthSummary, StrategyDetail,
};
pub use rolling::RollingDeployer;
pub use strategy::{Deployer, StrategyContext, StrategyKind, StrategySelector};
pub use traffic::TrafficSplit;
