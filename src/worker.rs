// ABOUTME: Queue worker: dequeue, lock the target, run the strategy, settle the job.
// ABOUTME: Job metadata is mapped to a DeployRequest; bad jobs are dead-lettered.

use crate::config::LockConfig;
use crate::deploy::{DeployError, DeployRequest, Deployer, DeploymentResult, StrategySelector};
use crate::lock::{DistributedLock, LockError};
use crate::queue::{Delivery, DeploymentJob, DeploymentQueue, QueueError};
use crate::store::CoordinationStore;
use futures::FutureExt;
use snafu::{ResultExt, Snafu};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Strategy used when a job does not name one.
pub const DEFAULT_STRATEGY: &str = "rolling";

/// Prefix of job metadata keys that become container environment variables.
const ENV_PREFIX: &str = "env.";

/// Pause after a store failure before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WorkerError {
    #[snafu(display("failed to dequeue: {source}"))]
    Dequeue { source: QueueError },

    #[snafu(display("failed to settle job {job_id}: {source}"))]
    Settle { job_id: String, source: QueueError },

    #[snafu(display("lock {lock} failed: {source}"))]
    Lock { lock: String, source: LockError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    /// The queue could not be read.
    Queue,
    /// A job was processed but could not be acked, nacked, or requeued.
    /// The watchdog will redeliver it.
    Settle,
    /// The lock store failed (contention is a `JobReport`, not an error).
    Lock,
}

impl WorkerError {
    pub fn kind(&self) -> WorkerErrorKind {
        match self {
            WorkerError::Dequeue { .. } => WorkerErrorKind::Queue,
            WorkerError::Settle { .. } => WorkerErrorKind::Settle,
            WorkerError::Lock { .. } => WorkerErrorKind::Lock,
        }
    }
}

/// What happened to one delivery.
#[derive(Debug)]
pub enum JobReport {
    /// The strategy ran; the job is acked whatever the outcome.
    Deployed(Box<DeploymentResult>),
    /// The job could not be turned into a deployment and was dead-lettered.
    Rejected { job_id: String, reason: String },
    /// Another worker held the target lock; the job went back to pending.
    Contended { job_id: String },
    /// Nothing arrived within the block timeout.
    Idle,
}

pub struct Worker {
    name: String,
    queue: Arc<DeploymentQueue>,
    store: Arc<dyn CoordinationStore>,
    selector: StrategySelector,
    lock: LockConfig,
    block_timeout: Duration,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("lock", &self.lock)
            .finish()
    }
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<DeploymentQueue>,
        store: Arc<dyn CoordinationStore>,
        selector: StrategySelector,
        lock: LockConfig,
        block_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            store,
            selector,
            lock,
            block_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take at most one job through dequeue → lock → deploy → settle → unlock.
    pub async fn process_next(&self, block_timeout: Duration) -> Result<JobReport, WorkerError> {
        match self.queue.dequeue(block_timeout).await.context(DequeueSnafu)? {
            Some(delivery) => self.handle(delivery).await,
            None => Ok(JobReport::Idle),
        }
    }

    async fn handle(&self, delivery: Delivery) -> Result<JobReport, WorkerError> {
        let job_id = delivery.job.job_id.clone();

        let (deployer, request) = match self.prepare(&delivery.job) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(worker = %self.name, job_id = %job_id, "rejecting job: {}", e);
                self.queue
                    .nack(&delivery)
                    .await
                    .context(SettleSnafu { job_id: &job_id })?;
                return Ok(JobReport::Rejected {
                    job_id,
                    reason: e.to_string(),
                });
            }
        };

        let lock = DistributedLock::new(
            self.store.clone(),
            lock_name(&request),
            self.lock.ttl,
        );
        tracing::info!(
            worker = %self.name,
            job_id = %job_id,
            strategy = %deployer.kind(),
            target = %request.target_id,
            "processing job"
        );

        let run = lock
            .locked(self.lock.acquire_timeout, self.lock.retry_interval, || {
                deployer.deploy(&request)
            })
            .await;

        match run {
            Ok(result) => {
                let acked = self
                    .queue
                    .ack(&delivery)
                    .await
                    .context(SettleSnafu { job_id: &job_id })?;
                if !acked {
                    tracing::warn!(
                        worker = %self.name,
                        job_id = %job_id,
                        "job was no longer in processing at ack time"
                    );
                }
                Ok(JobReport::Deployed(Box::new(result)))
            }
            Err(LockError::Contended { name, waited }) => {
                tracing::info!(
                    worker = %self.name,
                    job_id = %job_id,
                    lock = %name,
                    ?waited,
                    "target busy, requeueing job"
                );
                self.queue
                    .requeue(&delivery)
                    .await
                    .context(SettleSnafu { job_id: &job_id })?;
                Ok(JobReport::Contended { job_id })
            }
            Err(source) => Err(WorkerError::Lock {
                lock: lock.name().to_string(),
                source,
            }),
        }
    }

    fn prepare(&self, job: &DeploymentJob) -> Result<(Deployer, DeployRequest), DeployError> {
        let strategy = job
            .metadata
            .get("strategy")
            .map(String::as_str)
            .unwrap_or(DEFAULT_STRATEGY);
        let deployer = self.selector.select(strategy)?;
        let request = request_from_job(job)?;
        request.validate()?;
        Ok((deployer, request))
    }

    /// Process jobs until `shutdown` resolves. Returns the number of
    /// deliveries handled.
    ///
    /// Shutdown never interrupts a deployment in progress. A dequeue that is
    /// already waiting is allowed to finish (at most `block_timeout`) and any
    /// job it moved into processing is handled, since a blocking move may
    /// already have taken the job store-side.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> usize {
        tokio::pin!(shutdown);
        let mut handled = 0;
        let mut stopping = false;
        tracing::info!(worker = %self.name, "worker started");

        while !stopping {
            if (&mut shutdown).now_or_never().is_some() {
                break;
            }

            let dequeue = self.queue.dequeue(self.block_timeout);
            tokio::pin!(dequeue);
            let next = tokio::select! {
                next = &mut dequeue => next,
                _ = &mut shutdown => {
                    stopping = true;
                    tracing::info!(worker = %self.name, "shutdown requested; finishing dequeue");
                    dequeue.await
                }
            };

            let report = match next {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => continue,
                Err(source) => Err(WorkerError::Dequeue { source }),
            };

            match report {
                Ok(report) => {
                    handled += 1;
                    log_report(&self.name, &report);
                }
                Err(e) => {
                    tracing::error!(worker = %self.name, kind = ?e.kind(), "{}", e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!(worker = %self.name, handled, "worker stopped");
        handled
    }
}

fn log_report(worker: &str, report: &JobReport) {
    match report {
        JobReport::Deployed(result) => tracing::info!(
            worker,
            deployment = %result.deployment_id,
            outcome = ?result.outcome,
            "job finished"
        ),
        JobReport::Rejected { job_id, reason } => {
            tracing::warn!(worker, job_id = %job_id, "job dead-lettered: {}", reason)
        }
        JobReport::Contended { job_id } => {
            tracing::debug!(worker, job_id = %job_id, "job requeued")
        }
        JobReport::Idle => {}
    }
}

/// One deployment per target at a time, whatever the strategy.
pub fn lock_name(request: &DeployRequest) -> String {
    format!("deploy:{}", request.target_id)
}

/// Build a request from job metadata.
///
/// `target_id` and `port` are required. `image_tag` defaults to
/// `<repo-name>:<first 12 chars of commit_sha>` and `container_name` to the
/// repository name. `env.KEY` entries become environment variables.
pub fn request_from_job(job: &DeploymentJob) -> Result<DeployRequest, DeployError> {
    let invalid = |reason: String| DeployError::InvalidJob {
        job_id: job.job_id.clone(),
        reason,
    };
    let field = |key: &str| metadata(job, key);

    let target = field("target_id").ok_or_else(|| invalid("metadata.target_id is missing".into()))?;
    let port = field("port")
        .ok_or_else(|| invalid("metadata.port is missing".into()))?
        .parse::<u16>()
        .map_err(|e| invalid(format!("metadata.port: {e}")))?;

    let repo = repo_name(&job.repository);
    let image_tag = match field("image_tag") {
        Some(tag) => tag.to_string(),
        None => {
            let sha: String = job.commit_sha.trim().chars().take(12).collect();
            if repo.is_empty() || sha.is_empty() {
                return Err(invalid(
                    "no image_tag and no repository/commit to derive one from".into(),
                ));
            }
            format!("{repo}:{sha}")
        }
    };
    let container_name = field("container_name").map_or(repo, str::to_string);

    let mut request = DeployRequest::new(target, image_tag, container_name, port)
        .with_deployment_id(job.job_id.as_str());
    if let Some(path) = field("health_check_path") {
        request = request.with_health_check_path(path);
    }
    if let Some(previous) = field("previous_image_tag") {
        request = request.with_previous_image(previous);
    }
    for (key, value) in &job.metadata {
        if let Some(name) = key.strip_prefix(ENV_PREFIX)
            && !name.is_empty()
        {
            request = request.with_env(name, value.as_str());
        }
    }
    Ok(request)
}

/// Trimmed metadata value; blank counts as absent.
fn metadata<'a>(job: &'a DeploymentJob, key: &str) -> Option<&'a str> {
    job.metadata
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Last path segment of a repository, lowercased, without `.git`.
fn repo_name(repository: &str) -> String {
    repository
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git")
        .to_ascii_lowercase()
}
