// ABOUTME: Error types for choosing and preparing a deployment.
// ABOUTME: Rollout failures are DeploymentResult values, not errors.

use super::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// No strategy is registered under this name.
    #[error("unknown strategy '{name}' (known: {known})")]
    UnknownStrategy { name: String, known: String },

    #[error("invalid deployment request: {0}")]
    Validation(#[from] ValidationError),

    /// A queued job cannot be turned into a request.
    #[error("job {job_id} is not deployable: {reason}")]
    InvalidJob { job_id: String, reason: String },
}
