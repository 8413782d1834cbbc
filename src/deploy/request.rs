// ABOUTME: Deployment request shared by every strategy, with up-front validation.
// ABOUTME: Validation failures are the caller's fault and are never retried.

use crate::types::{
    ContainerName, ContainerNameError, DeploymentId, ImageRef, ParseImageRefError, TargetId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub deployment_id: DeploymentId,
    pub target_id: TargetId,
    pub image_tag: String,
    pub container_name: String,
    /// Host port the production container publishes.
    pub port: u16,
    pub health_check_path: String,
    /// Image to fall back to if the new one is rejected.
    #[serde(default)]
    pub previous_image_tag: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("deployment id must not be empty")]
    EmptyDeploymentId,

    #[error("target id must not be empty")]
    EmptyTarget,

    #[error("invalid container name: {0}")]
    ContainerName(#[from] ContainerNameError),

    #[error("invalid {field}: {source}")]
    Image {
        field: &'static str,
        source: ParseImageRefError,
    },

    #[error("port must be greater than zero")]
    ZeroPort,

    #[error("health check path must start with '/': {0}")]
    HealthPath(String),

    #[error("{0} is required for this operation")]
    Missing(&'static str),
}

/// Typed views of a request that passed validation.
#[derive(Debug, Clone)]
pub struct Validated {
    pub image: ImageRef,
    pub container_name: ContainerName,
    pub previous_image: Option<ImageRef>,
}

impl DeployRequest {
    pub fn new(
        target_id: impl Into<TargetId>,
        image_tag: impl Into<String>,
        container_name: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            deployment_id: DeploymentId::new(uuid::Uuid::new_v4().to_string()),
            target_id: target_id.into(),
            image_tag: image_tag.into(),
            container_name: container_name.into(),
            port,
            health_check_path: "/health".to_string(),
            previous_image_tag: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_deployment_id(mut self, id: impl Into<DeploymentId>) -> Self {
        self.deployment_id = id.into();
        self
    }

    pub fn with_previous_image(mut self, tag: impl Into<String>) -> Self {
        self.previous_image_tag = Some(tag.into());
        self
    }

    pub fn with_health_check_path(mut self, path: impl Into<String>) -> Self {
        self.health_check_path = path.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<Validated, ValidationError> {
        if self.deployment_id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyDeploymentId);
        }
        if self.target_id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyTarget);
        }

        let container_name = ContainerName::new(&self.container_name)?;
        let image = ImageRef::parse(&self.image_tag).map_err(|source| ValidationError::Image {
            field: "image_tag",
            source,
        })?;
        let previous_image = self
            .previous_image_tag
            .as_deref()
            .map(ImageRef::parse)
            .transpose()
            .map_err(|source| ValidationError::Image {
                field: "previous_image_tag",
                source,
            })?;

        if self.port == 0 {
            return Err(ValidationError::ZeroPort);
        }
        if !self.health_check_path.starts_with('/') {
            return Err(ValidationError::HealthPath(self.health_check_path.clone()));
        }

        Ok(Validated {
            image,
            container_name,
            previous_image,
        })
    }
}
