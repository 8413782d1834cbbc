// ABOUTME: Circuit breaker, retry, and health probe settings.
// ABOUTME: Converted into runtime policies by the resilience module.

use crate::resilience::{Backoff, BreakerConfig, ErrorClass, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive (already retried) failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_recovery_timeout", with = "humantime_serde")]
    pub recovery_timeout: Duration,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResilienceConfig {
    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_delay", with = "humantime_serde")]
    pub delay: Duration,

    /// Exponential backoff; absent means a fixed `delay` between attempts.
    #[serde(default = "default_backoff")]
    pub backoff: Option<BackoffConfig>,

    /// Error classes worth retrying. Anything else fails on the first attempt.
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<ErrorClass>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

fn default_attempts() -> u32 {
    3
}

fn default_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff() -> Option<BackoffConfig> {
    Some(BackoffConfig {
        multiplier: default_multiplier(),
        max_delay: default_max_delay(),
    })
}

fn default_retry_on() -> Vec<ErrorClass> {
    vec![ErrorClass::Connection, ErrorClass::Timeout]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay: default_delay(),
            backoff: default_backoff(),
            retry_on: default_retry_on(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.max(1),
            delay: self.delay,
            backoff: self.backoff.as_ref().map(|b| Backoff {
                multiplier: b.multiplier,
                max_delay: b.max_delay,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Per-probe timeout.
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout: default_probe_timeout(),
        }
    }
}
