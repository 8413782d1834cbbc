// ABOUTME: Decorator that puts retry and a circuit breaker around a collaborator.
// ABOUTME: Implements the target controller and health prober traits by delegation.

use super::{BreakerConfig, BreakerError, CircuitBreaker, ErrorClass, RetryError, RetryPolicy};
use crate::health::{HealthCheck, HealthProber, ProbeError};
use crate::target::{CommandOutput, ContainerStatus, StartContainer, TargetController, TargetError};
use crate::types::{ContainerId, ContainerName, TargetId};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Errors a [`Resilient`] wrapper can classify and report in its own terms.
pub trait Guarded: std::error::Error + Sized {
    fn class(&self) -> ErrorClass;

    fn circuit_open(name: String, retry_in: Duration) -> Self;

    fn exhausted(attempts: u32, last: Self) -> Self;
}

/// `inner` with every call retried per `policy`, behind one breaker.
#[derive(Debug)]
pub struct Resilient<T> {
    inner: T,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
    retry_on: Vec<ErrorClass>,
}

impl<T> Resilient<T> {
    pub fn new(
        name: impl Into<String>,
        inner: T,
        breaker: BreakerConfig,
        policy: RetryPolicy,
        retry_on: Vec<ErrorClass>,
    ) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(name, breaker),
            policy,
            retry_on,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    async fn guard<R, E, F, Fut>(&self, op: F) -> Result<R, E>
    where
        E: Guarded,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let retryable = |e: &E| self.retry_on.contains(&e.class());
        match self
            .breaker
            .call(|| self.policy.run(op, retryable))
            .await
        {
            Ok(value) => Ok(value),
            Err(BreakerError::Open { name, retry_in }) => Err(E::circuit_open(name, retry_in)),
            Err(BreakerError::Inner(RetryError::Exhausted { attempts, last })) => {
                Err(E::exhausted(attempts, last))
            }
            Err(BreakerError::Inner(RetryError::Rejected(e))) => Err(e),
        }
    }
}

#[async_trait]
impl<T: TargetController> TargetController for Resilient<T> {
    async fn start_container(
        &self,
        target: &TargetId,
        request: &StartContainer,
    ) -> Result<ContainerId, TargetError> {
        self.guard(|| self.inner.start_container(target, request))
            .await
    }

    async fn stop_container(
        &self,
        target: &TargetId,
        name: &ContainerName,
        force: bool,
    ) -> Result<bool, TargetError> {
        self.guard(|| self.inner.stop_container(target, name, force))
            .await
    }

    async fn run_command(
        &self,
        target: &TargetId,
        command: &str,
    ) -> Result<CommandOutput, TargetError> {
        self.guard(|| self.inner.run_command(target, command)).await
    }

    async fn resolve_address(&self, target: &TargetId) -> Result<Option<String>, TargetError> {
        self.guard(|| self.inner.resolve_address(target)).await
    }

    async fn container_status(
        &self,
        target: &TargetId,
        name: &ContainerName,
    ) -> Result<ContainerStatus, TargetError> {
        self.guard(|| self.inner.container_status(target, name))
            .await
    }
}

#[async_trait]
impl<T: HealthProber> HealthProber for Resilient<T> {
    async fn check_http(&self, url: &str) -> Result<HealthCheck, ProbeError> {
        self.guard(|| self.inner.check_http(url)).await
    }

    async fn check_tcp(&self, host: &str, port: u16) -> Result<HealthCheck, ProbeError> {
        self.guard(|| self.inner.check_tcp(host, port)).await
    }
}
