// ABOUTME: SSH transport errors.
// ABOUTME: Connection, authentication, host key, and remote execution failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SshError {
    #[error("connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("connection to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("authentication failed for {user}@{host}")]
    AuthenticationFailed { user: String, host: String },

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("failed to open channel: {0}")]
    Channel(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("channel closed without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

impl SshError {
    /// Whether a fresh session might succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SshError::Connection { .. }
                | SshError::ConnectTimeout { .. }
                | SshError::Channel(_)
                | SshError::ChannelClosed
                | SshError::Protocol(_)
        )
    }
}
