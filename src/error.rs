// ABOUTME: Application-wide error types for convoy.
// ABOUTME: Wraps config, store, queue, lock, and worker failures for the CLI.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("coordination store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error(transparent)]
    Lock(#[from] crate::lock::LockError),

    #[error(transparent)]
    Deploy(#[from] crate::deploy::DeployError),

    #[error(transparent)]
    Worker(#[from] crate::worker::WorkerError),

    #[error("deployment {0} did not succeed")]
    DeploymentFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
