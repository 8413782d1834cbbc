// ABOUTME: Single-shot health probes used by the deployment strategies.
// ABOUTME: An unhealthy service is a normal result; errors mean the probe itself could not run.

mod network;

pub use network::NetworkProber;

use crate::resilience::{ErrorClass, Guarded};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub healthy: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

impl HealthCheck {
    pub fn passed(status_code: Option<u16>, response_time_ms: u64) -> Self {
        Self {
            healthy: true,
            status_code,
            response_time_ms,
            error_message: None,
        }
    }

    pub fn failed(response_time_ms: u64, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status_code: None,
            response_time_ms,
            error_message: Some(error.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("probe transport failed: {0}")]
    Connection(String),

    #[error("circuit {name} is open; next trial in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ProbeError>,
    },
}

impl Guarded for ProbeError {
    fn class(&self) -> ErrorClass {
        match self {
            ProbeError::Connection(_) => ErrorClass::Connection,
            ProbeError::RetriesExhausted { last, .. } => last.class(),
            ProbeError::InvalidUrl { .. } | ProbeError::CircuitOpen { .. } => ErrorClass::Other,
        }
    }

    fn circuit_open(name: String, retry_in: Duration) -> Self {
        ProbeError::CircuitOpen { name, retry_in }
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        ProbeError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        }
    }
}

#[async_trait]
pub trait HealthProber: Send + Sync {
    /// GET `url`; any 2xx is healthy.
    async fn check_http(&self, url: &str) -> Result<HealthCheck, ProbeError>;

    /// Healthy if a TCP connection to `host:port` can be opened.
    async fn check_tcp(&self, host: &str, port: u16) -> Result<HealthCheck, ProbeError>;
}
