// ABOUTME: Circuit breaker and retry policy for calls to unreliable collaborators.
// ABOUTME: Retry runs inside the breaker so the breaker counts already-retried failures.

mod breaker;
mod resilient;
mod retry;

pub use breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
pub use resilient::{Guarded, Resilient};
pub use retry::{Backoff, RetryError, RetryPolicy};

use serde::{Deserialize, Serialize};

/// Coarse failure category used to decide whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Could not reach the collaborator.
    Connection,
    Timeout,
    /// The collaborator ran the request and reported failure.
    Command,
    /// The collaborator answered with something unparseable.
    Protocol,
    NotFound,
    Other,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::Connection => "connection",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Command => "command",
            ErrorClass::Protocol => "protocol",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Other => "other",
        };
        f.write_str(name)
    }
}
