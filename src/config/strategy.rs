// ABOUTME: Rolling and canary strategy settings.
// ABOUTME: The canary always runs exactly three stages; their weights and windows are tunable.

use super::deserialize::deserialize_fraction;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct RollingConfig {
    /// Pause between starting the container and the first probe.
    #[serde(default = "default_startup_grace", with = "humantime_serde")]
    pub startup_grace: Duration,

    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,

    /// Total observation window.
    #[serde(default = "default_check_duration", with = "humantime_serde")]
    pub check_duration: Duration,

    /// Minimum fraction of passing probes to promote.
    #[serde(
        default = "default_success_threshold",
        deserialize_with = "deserialize_fraction"
    )]
    pub success_threshold: f64,
}

fn default_startup_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_check_duration() -> Duration {
    Duration::from_secs(120)
}

fn default_success_threshold() -> f64 {
    0.8
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            startup_grace: default_startup_grace(),
            check_interval: default_check_interval(),
            check_duration: default_check_duration(),
            success_threshold: default_success_threshold(),
        }
    }
}

/// One step of a canary rollout. Weights are relative shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CanaryStage {
    pub canary_weight: u32,
    pub prod_weight: u32,
    /// Observation window; zero promotes without observing.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl CanaryStage {
    pub const fn new(canary_weight: u32, prod_weight: u32, duration: Duration) -> Self {
        Self {
            canary_weight,
            prod_weight,
            duration,
        }
    }

    /// Canary share as a rounded percentage of total weight.
    pub fn canary_percentage(&self) -> u32 {
        let total = u64::from(self.canary_weight) + u64::from(self.prod_weight);
        if total == 0 {
            return 0;
        }
        (f64::from(self.canary_weight) / total as f64 * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Where the rendered nginx upstream block is written on the target.
    #[serde(default = "default_proxy_config_path")]
    pub config_path: String,

    #[serde(default = "default_reload_command")]
    pub reload_command: String,

    /// Host the proxy uses to reach both containers.
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,
}

fn default_proxy_config_path() -> String {
    "/etc/nginx/conf.d/convoy-upstream.conf".to_string()
}

fn default_reload_command() -> String {
    "nginx -s reload".to_string()
}

fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: default_proxy_config_path(),
            reload_command: default_reload_command(),
            upstream_host: default_upstream_host(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CanaryConfig {
    /// Host port the canary container publishes.
    #[serde(default = "default_canary_port")]
    pub canary_port: u16,

    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,

    /// Highest tolerated fraction of failed probes per stage.
    #[serde(
        default = "default_error_rate_threshold",
        deserialize_with = "deserialize_fraction"
    )]
    pub error_rate_threshold: f64,

    #[serde(default = "default_stages")]
    pub stages: [CanaryStage; 3],

    #[serde(default)]
    pub proxy: ProxyConfig,
}

fn default_canary_port() -> u16 {
    8081
}

fn default_error_rate_threshold() -> f64 {
    0.05
}

fn default_stages() -> [CanaryStage; 3] {
    [
        CanaryStage::new(1, 9, Duration::from_secs(300)),
        CanaryStage::new(1, 1, Duration::from_secs(300)),
        CanaryStage::new(1, 0, Duration::ZERO),
    ]
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            canary_port: default_canary_port(),
            check_interval: default_check_interval(),
            error_rate_threshold: default_error_rate_threshold(),
            stages: default_stages(),
            proxy: ProxyConfig::default(),
        }
    }
}
