// ABOUTME: Remote operations against a deployment target.
// ABOUTME: Container lifecycle, shell commands, address resolution, and status.

mod ssh;

pub use crate::ssh::CommandOutput;
pub use ssh::{SshTargetController, shell_quote};

use crate::resilience::{ErrorClass, Guarded};
use crate::types::{ContainerId, ContainerName, ImageRef, TargetId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Parameters for starting one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartContainer {
    pub image: ImageRef,
    pub name: ContainerName,
    /// Host port the container publishes.
    pub port: u16,
    pub env: BTreeMap<String, String>,
    /// Force-remove any container already using `name` first.
    pub stop_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    pub running: bool,
    pub container_id: Option<ContainerId>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
}

impl ContainerStatus {
    pub fn missing() -> Self {
        Self {
            running: false,
            container_id: None,
            status: "missing".to_string(),
            started_at: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("unknown target: {0}")]
    UnknownTarget(TargetId),

    #[error("cannot reach target {target}: {reason}")]
    Connection { target: TargetId, reason: String },

    #[error("cannot authenticate to {target}: {reason}")]
    Auth { target: TargetId, reason: String },

    #[error("operation on {target} timed out after {timeout:?}")]
    Timeout { target: TargetId, timeout: Duration },

    #[error("command on {target} exited with {exit_code}: {stderr}")]
    CommandFailed {
        target: TargetId,
        exit_code: u32,
        stderr: String,
    },

    #[error("unexpected output from {target}: {detail}")]
    Protocol { target: TargetId, detail: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("circuit {name} is open; next trial in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<TargetError>,
    },
}

impl Guarded for TargetError {
    fn class(&self) -> ErrorClass {
        match self {
            TargetError::Connection { .. } => ErrorClass::Connection,
            TargetError::Timeout { .. } => ErrorClass::Timeout,
            TargetError::CommandFailed { .. } => ErrorClass::Command,
            TargetError::Protocol { .. } => ErrorClass::Protocol,
            TargetError::NotFound(_) => ErrorClass::NotFound,
            TargetError::RetriesExhausted { last, .. } => last.class(),
            TargetError::UnknownTarget(_)
            | TargetError::Auth { .. }
            | TargetError::CircuitOpen { .. } => ErrorClass::Other,
        }
    }

    fn circuit_open(name: String, retry_in: Duration) -> Self {
        TargetError::CircuitOpen { name, retry_in }
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        TargetError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }
    }
}

/// Remote control of the containers on a deployment target.
///
/// Strategies only see this trait; calls are expected to go through
/// [`crate::resilience::Resilient`].
#[async_trait]
pub trait TargetController: Send + Sync {
    async fn start_container(
        &self,
        target: &TargetId,
        request: &StartContainer,
    ) -> Result<ContainerId, TargetError>;

    /// Returns `false` if no such container existed.
    async fn stop_container(
        &self,
        target: &TargetId,
        name: &ContainerName,
        force: bool,
    ) -> Result<bool, TargetError>;

    /// Run a shell command. A non-zero exit is reported in the output, not
    /// as an error.
    async fn run_command(&self, target: &TargetId, command: &str)
    -> Result<CommandOutput, TargetError>;

    /// Address other services use to reach this target.
    async fn resolve_address(&self, target: &TargetId) -> Result<Option<String>, TargetError>;

    async fn container_status(
        &self,
        target: &TargetId,
        name: &ContainerName,
    ) -> Result<ContainerStatus, TargetError>;
}
