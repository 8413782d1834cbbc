// ABOUTME: Configuration types and parsing for convoy.yml.
// ABOUTME: Handles discovery, YAML parsing, env overrides, and semantic validation.

mod coordination;
mod deserialize;
mod env_value;
mod init;
mod resilience;
mod strategy;
mod target;

pub use coordination::{LockConfig, QueueConfig, STORE_URL_ENV, StoreConfig};
pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;
pub use resilience::{BackoffConfig, HealthConfig, ResilienceConfig, RetryConfig};
pub use strategy::{CanaryConfig, CanaryStage, ProxyConfig, RollingConfig};
pub use target::TargetConfig;

use crate::error::{Error, Result};
use deserialize::deserialize_targets;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "convoy.yml";
pub const CONFIG_FILENAME_ALT: &str = "convoy.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".convoy/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_targets")]
    pub targets: NonEmpty<TargetConfig>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub rolling: RollingConfig,

    #[serde(default)]
    pub canary: CanaryConfig,

    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        candidates
            .iter()
            .find(|path| path.exists())
            .map(|path| Self::load(path))
            .unwrap_or_else(|| Err(Error::ConfigNotFound(dir.to_path_buf())))
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(STORE_URL_ENV)
            && !url.trim().is_empty()
        {
            tracing::debug!("store url overridden by {}", STORE_URL_ENV);
            self.store.url = url;
        }
        self
    }

    pub fn target(&self, id: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Checks serde cannot express on its own.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.id.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate target id: {}",
                    target.id
                )));
            }
            if target.container_port == 0 {
                return Err(Error::InvalidConfig(format!(
                    "target {} has container_port 0",
                    target.id
                )));
            }
        }

        if self.rolling.check_interval.is_zero() || self.canary.check_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "health check interval must be greater than zero".to_string(),
            ));
        }

        if let Some(stage) = self
            .canary
            .stages
            .iter()
            .find(|s| s.canary_weight == 0)
        {
            return Err(Error::InvalidConfig(format!(
                "canary stage {:?} sends no traffic to the canary",
                stage
            )));
        }

        if self.resilience.failure_threshold == 0 {
            return Err(Error::InvalidConfig(
                "resilience.failure_threshold must be at least 1".to_string(),
            ));
        }

        if self.lock.ttl.is_zero() {
            return Err(Error::InvalidConfig("lock.ttl must be greater than zero".to_string()));
        }

        Ok(())
    }

    pub fn template() -> Self {
        Config {
            targets: NonEmpty::new(TargetConfig {
                id: "web-1".to_string(),
                host: "web-1.example.com".to_string(),
                ssh_port: 22,
                user: Some("deploy".to_string()),
                key_path: None,
                address: None,
                container_port: 8080,
                trust_first_connection: false,
                env: Default::default(),
            }),
            store: StoreConfig {
                url: "redis://127.0.0.1:6379/0".to_string(),
            },
            queue: QueueConfig::default(),
            lock: LockConfig::default(),
            rolling: RollingConfig::default(),
            canary: CanaryConfig::default(),
            resilience: ResilienceConfig::default(),
            health: HealthConfig::default(),
        }
    }
}
