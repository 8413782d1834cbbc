// ABOUTME: SSH transport for reaching deployment targets.
// ABOUTME: Agent or key-file authentication with known_hosts verification.

mod client;
mod error;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::SshError;
