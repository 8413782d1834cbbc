// ABOUTME: Coordination store, queue, and lock settings.
// ABOUTME: Durations are humantime strings ("5s", "10m").

use serde::Deserialize;
use std::time::Duration;

pub const STORE_URL_ENV: &str = "CONVOY_STORE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `memory://` for a single process, `redis://host:port/db` otherwise.
    #[serde(default = "default_store_url")]
    pub url: String,
}

fn default_store_url() -> String {
    "memory://".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Key prefix for the pending, processing, and dead-letter lists.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// How long a worker waits for a job before polling again.
    #[serde(default = "default_block_timeout", with = "humantime_serde")]
    pub block_timeout: Duration,

    /// Safety-net expiry for processing timestamps.
    #[serde(default = "default_processing_ttl", with = "humantime_serde")]
    pub processing_ttl: Duration,

    /// Age after which a processing job is considered abandoned.
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,

    #[serde(default = "default_watchdog_interval", with = "humantime_serde")]
    pub watchdog_interval: Duration,
}

fn default_prefix() -> String {
    "queue".to_string()
}

fn default_block_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_processing_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(600)
}

fn default_watchdog_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            block_timeout: default_block_timeout(),
            processing_ttl: default_processing_ttl(),
            stale_after: default_stale_after(),
            watchdog_interval: default_watchdog_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Should exceed one health-check window; the worker extends it while
    /// a deployment runs.
    #[serde(default = "default_lock_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
}

fn default_lock_ttl() -> Duration {
    Duration::from_secs(600)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retry_interval() -> Duration {
    Duration::from_millis(500)
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: default_lock_ttl(),
            acquire_timeout: default_acquire_timeout(),
            retry_interval: default_retry_interval(),
        }
    }
}
