// ABOUTME: Three-state circuit breaker (closed, open, half-open).
// ABOUTME: Opens after consecutive failures and admits one trial call after the recovery timeout.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the wrapped call.
    #[error("circuit {name} is open; next trial in {retry_in:?}")]
    Open { name: String, retry_in: Duration },

    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Trips after `failure_threshold` consecutive failures.
///
/// While open every call is rejected until `recovery_timeout` has passed
/// since the last failure; then exactly one trial call is let through. Its
/// success closes the breaker, its failure reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut permit = self.admit().map_err(|retry_in| BreakerError::Open {
            name: self.name.clone(),
            retry_in,
        })?;

        let result = f().await;
        permit.settled = true;

        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Admit a call, or return how long until the next trial.
    fn admit(&self) -> Result<Permit<'_>, Duration> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(Permit::new(self, false)),
            BreakerState::Open => {
                let reopen_at = inner
                    .last_failure
                    .map(|t| t + self.config.recovery_timeout)
                    .unwrap_or_else(Instant::now);
                let now = Instant::now();
                if now < reopen_at {
                    return Err(reopen_at - now);
                }
                tracing::info!(breaker = %self.name, "circuit half-open; admitting trial call");
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
            BreakerState::HalfOpen if inner.trial_in_flight => Err(Duration::ZERO),
            BreakerState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.trial_in_flight = false;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;

        let trips = inner.state == BreakerState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;
        if trips && inner.state != BreakerState::Open {
            tracing::warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                "circuit opened"
            );
            inner.state = BreakerState::Open;
        }
    }
}

/// Frees the half-open trial slot if the trial call is dropped mid-flight.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(30),
            },
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        b.call(|| async { Err::<(), _>("boom") }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_rejects_without_calling() {
        let b = breaker(3);
        for _ in 0..3 {
            assert!(matches!(fail(&b).await, Err(BreakerError::Inner("boom"))));
        }
        assert_eq!(b.state(), BreakerState::Open);

        let calls = AtomicU32::new(0);
        let result = b
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let b = breaker(3);
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        b.call(|| async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(b.failure_count(), 0);
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_success_closes() {
        let b = breaker(1);
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        let state_during = b
            .call(|| async { Ok::<_, &str>(b.state()) })
            .await
            .unwrap();
        assert_eq!(state_during, BreakerState::HalfOpen);
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn trial_failure_reopens() {
        let b = breaker(2);
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), BreakerState::Open);

        match fail(&b).await {
            Err(BreakerError::Open { retry_in, .. }) => {
                assert_eq!(retry_in, Duration::from_secs(30))
            }
            other => panic!("expected open, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_trial_at_a_time() {
        let b = breaker(1);
        fail(&b).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(31)).await;

        let concurrent = b
            .call(|| async {
                let inner = b.call(|| async { Ok::<_, &str>(()) }).await;
                Ok::<_, &str>(matches!(inner, Err(BreakerError::Open { .. })))
            })
            .await
            .unwrap();
        assert!(concurrent);
    }
}
