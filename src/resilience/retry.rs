// ABOUTME: Bounded retry with optional capped exponential backoff.
// ABOUTME: Only errors accepted by the caller's predicate are retried.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub multiplier: f64,
    pub max_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: Option<Backoff>,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// Failed with an error the predicate does not retry.
    #[error(transparent)]
    Rejected(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Rejected(e) => e,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
            backoff: Some(Backoff {
                multiplier: 2.0,
                max_delay: Duration::from_secs(30),
            }),
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
            backoff: None,
        }
    }

    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: None,
        }
    }

    /// Pause before retry number `retry` (0 for the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let Some(backoff) = self.backoff else {
            return self.delay;
        };
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.delay.as_secs_f64() * backoff.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(backoff.max_delay, |delay| delay.min(backoff.max_delay))
    }

    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !retryable(&e) => return Err(RetryError::Rejected(e)),
                Err(e) if attempt >= attempts => {
                    return Err(RetryError::Exhausted { attempts, last: e });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt - 1);
                    tracing::debug!(attempt, ?delay, "retrying after error: {}", e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
