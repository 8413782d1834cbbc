// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed IDs keep deployment, target, and container IDs apart.

mod container_name;
mod id;
mod image_ref;

pub use container_name::{ContainerName, ContainerNameError};
pub use id::{ContainerId, DeploymentId, TargetId};
pub use image_ref::{ImageRef, ParseImageRefError};
