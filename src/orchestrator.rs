// ABOUTME: Process-level wiring of store, queue, collaborators, and strategies.
// ABOUTME: Exposes enqueue, direct deploy/rollback, queue stats, and worker construction.

use crate::config::{Config, LockConfig, QueueConfig};
use crate::deploy::{DeployRequest, DeploymentResult, StrategyContext, StrategySelector};
use crate::error::Result;
use crate::health::{HealthProber, NetworkProber};
use crate::lock::DistributedLock;
use crate::queue::{DeploymentJob, DeploymentQueue, QueueStats, Watchdog};
use crate::resilience::Resilient;
use crate::store::{self, CoordinationStore};
use crate::target::{SshTargetController, TargetController};
use crate::worker::{Worker, lock_name};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for one remote command (image pulls included).
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything a caller needs to admit, run, and inspect deployments.
///
/// Constructed once per process and shared; there is no global state.
pub struct Orchestrator {
    store: Arc<dyn CoordinationStore>,
    queue: Arc<DeploymentQueue>,
    selector: StrategySelector,
    queue_config: QueueConfig,
    lock: LockConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("queue", &self.queue)
            .field("selector", &self.selector)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        selector: StrategySelector,
        queue_config: QueueConfig,
        lock: LockConfig,
    ) -> Self {
        let queue = Arc::new(DeploymentQueue::new(store.clone(), &queue_config));
        Self {
            store,
            queue,
            selector,
            queue_config,
            lock,
        }
    }

    /// Connect to the configured store and wrap the SSH controller and the
    /// network prober in retry and a circuit breaker each.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = store::connect(&config.store.url).await?;
        let resilience = &config.resilience;

        let controller: Arc<dyn TargetController> = Arc::new(Resilient::new(
            "target-controller",
            SshTargetController::new(config.targets.iter(), COMMAND_TIMEOUT)?,
            resilience.breaker(),
            resilience.retry.policy(),
            resilience.retry.retry_on.clone(),
        ));
        let prober: Arc<dyn HealthProber> = Arc::new(Resilient::new(
            "health-prober",
            NetworkProber::new(config.health.timeout),
            resilience.breaker(),
            resilience.retry.policy(),
            resilience.retry.retry_on.clone(),
        ));

        let selector = StrategySelector::new(StrategyContext {
            controller,
            prober,
            rolling: config.rolling.clone(),
            canary: config.canary.clone(),
        });
        Ok(Self::new(
            store,
            selector,
            config.queue.clone(),
            config.lock.clone(),
        ))
    }

    pub fn queue(&self) -> &Arc<DeploymentQueue> {
        &self.queue
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    pub async fn enqueue_deployment(&self, job: DeploymentJob) -> Result<String> {
        Ok(self.queue.enqueue(job).await?)
    }

    /// Run `strategy` now, outside the queue, holding the target lock.
    pub async fn deploy(&self, strategy: &str, request: &DeployRequest) -> Result<DeploymentResult> {
        let deployer = self.selector.select(strategy)?;
        let lock = self.target_lock(request);
        Ok(lock
            .locked(self.lock.acquire_timeout, self.lock.retry_interval, || {
                deployer.deploy(request)
            })
            .await?)
    }

    pub async fn rollback(
        &self,
        strategy: &str,
        request: &DeployRequest,
    ) -> Result<DeploymentResult> {
        let deployer = self.selector.select(strategy)?;
        let lock = self.target_lock(request);
        Ok(lock
            .locked(self.lock.acquire_timeout, self.lock.retry_interval, || {
                deployer.rollback(request)
            })
            .await?)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        Ok(self.queue.stats().await?)
    }

    pub fn worker(&self, name: impl Into<String>) -> Worker {
        Worker::new(
            name,
            self.queue.clone(),
            self.store.clone(),
            self.selector.clone(),
            self.lock.clone(),
            self.queue_config.block_timeout,
        )
    }

    pub fn watchdog(&self) -> Watchdog {
        Watchdog::new(
            self.queue.clone(),
            self.queue_config.watchdog_interval,
            self.queue_config.stale_after,
        )
    }

    fn target_lock(&self, request: &DeployRequest) -> DistributedLock {
        DistributedLock::new(self.store.clone(), lock_name(request), self.lock.ttl)
    }
}
