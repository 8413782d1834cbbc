// ABOUTME: Reliable FIFO deployment queue on top of the coordination store.
// ABOUTME: Pending → processing is atomic; crashed workers are recovered by the watchdog.

mod job;
mod watchdog;

pub use job::{Delivery, DeploymentJob};
pub use watchdog::Watchdog;

use crate::config::QueueConfig;
use crate::store::{CoordinationStore, ListEnd, StoreError};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Depth of each queue list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub dead_letter: usize,
}

/// Store keys used by one queue.
#[derive(Debug, Clone)]
struct QueueKeys {
    pending: String,
    processing: String,
    dead_letter: String,
    timestamp_prefix: String,
}

impl QueueKeys {
    fn new(prefix: &str) -> Self {
        Self {
            pending: format!("{prefix}:pending"),
            processing: format!("{prefix}:processing"),
            dead_letter: format!("{prefix}:dead-letter"),
            timestamp_prefix: format!("{prefix}:processing-ts:"),
        }
    }
}

/// At-least-once job queue with pending, processing, and dead-letter lists.
///
/// A job leaves *processing* only through [`ack`](Self::ack),
/// [`nack`](Self::nack), [`requeue`](Self::requeue), or
/// [`requeue_stale`](Self::requeue_stale). Delivery is FIFO; `priority` does
/// not reorder anything.
pub struct DeploymentQueue {
    store: Arc<dyn CoordinationStore>,
    keys: QueueKeys,
    processing_ttl: Duration,
}

impl std::fmt::Debug for DeploymentQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentQueue")
            .field("keys", &self.keys)
            .field("processing_ttl", &self.processing_ttl)
            .finish()
    }
}

impl DeploymentQueue {
    pub fn new(store: Arc<dyn CoordinationStore>, config: &QueueConfig) -> Self {
        Self {
            store,
            keys: QueueKeys::new(&config.prefix),
            processing_ttl: config.processing_ttl,
        }
    }

    /// Key holding the epoch-millisecond time a job entered processing.
    pub fn timestamp_key(&self, job_id: &str) -> String {
        format!("{}{}", self.keys.timestamp_prefix, job_id)
    }

    /// Admit a job, generating `job_id`/`created_at` if absent.
    pub async fn enqueue(&self, mut job: DeploymentJob) -> Result<String, QueueError> {
        job.stamp();
        let payload = job.to_payload()?;
        self.store.push(&self.keys.pending, &payload).await?;
        tracing::info!(
            job_id = %job.job_id,
            repository = %job.repository,
            commit = %job.commit_sha,
            "enqueued deployment job"
        );
        Ok(job.job_id)
    }

    /// Wait up to `block_timeout` for the next job and move it to processing.
    ///
    /// Payloads that are not valid jobs go straight to dead-letter and the
    /// wait continues for whatever time is left.
    pub async fn dequeue(&self, block_timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + block_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(payload) = self
                .store
                .blocking_move(&self.keys.pending, &self.keys.processing, remaining)
                .await?
            else {
                return Ok(None);
            };

            match DeploymentJob::from_payload(&payload) {
                Ok(job) => {
                    self.store
                        .set_with_ttl(
                            &self.timestamp_key(&job.job_id),
                            &now_millis().to_string(),
                            self.processing_ttl,
                        )
                        .await?;
                    tracing::debug!(job_id = %job.job_id, "dequeued deployment job");
                    return Ok(Some(Delivery { job, payload }));
                }
                Err(e) => {
                    tracing::warn!("dead-lettering unreadable payload: {}", e);
                    self.store
                        .relocate(
                            &self.keys.processing,
                            &self.keys.dead_letter,
                            &payload,
                            ListEnd::Tail,
                            None,
                        )
                        .await?;
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Remove a finished job from processing.
    ///
    /// Returns `false` if it was already acknowledged or reclaimed by the
    /// watchdog; the caller should do nothing further in that case.
    pub async fn ack(&self, delivery: &Delivery) -> Result<bool, QueueError> {
        let removed = self
            .store
            .remove(
                &self.keys.processing,
                &delivery.payload,
                Some(&self.timestamp_key(&delivery.job.job_id)),
            )
            .await?;
        if !removed {
            tracing::warn!(
                job_id = %delivery.job.job_id,
                "ack found no processing entry; job was already acked or reclaimed"
            );
        }
        Ok(removed)
    }

    /// Move a job from processing to dead-letter. It is never redelivered.
    pub async fn nack(&self, delivery: &Delivery) -> Result<bool, QueueError> {
        let moved = self
            .store
            .relocate(
                &self.keys.processing,
                &self.keys.dead_letter,
                &delivery.payload,
                ListEnd::Tail,
                Some(&self.timestamp_key(&delivery.job.job_id)),
            )
            .await?;
        if moved {
            tracing::warn!(job_id = %delivery.job.job_id, "job moved to dead-letter");
        }
        Ok(moved)
    }

    /// Put a job back on pending for a later attempt.
    ///
    /// The copy is enqueued before the original is acknowledged, so a crash
    /// in between duplicates the job rather than losing it.
    pub async fn requeue(&self, delivery: &Delivery) -> Result<bool, QueueError> {
        self.store
            .push(&self.keys.pending, &delivery.payload)
            .await?;
        let removed = self
            .store
            .remove(
                &self.keys.processing,
                &delivery.payload,
                Some(&self.timestamp_key(&delivery.job.job_id)),
            )
            .await?;
        tracing::info!(job_id = %delivery.job.job_id, "job requeued");
        Ok(removed)
    }

    /// Move processing jobs older than `max_age` back to pending.
    ///
    /// Jobs without a timestamp get one now and are reclaimed on a later pass
    /// if they are still there. Reclaimed jobs are delivered next.
    pub async fn requeue_stale(&self, max_age: Duration) -> Result<usize, QueueError> {
        let now = now_millis();
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let mut requeued = 0;

        for payload in self.store.range(&self.keys.processing).await? {
            let job = match DeploymentJob::from_payload(&payload) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!("dead-lettering unreadable processing payload: {}", e);
                    self.store
                        .relocate(
                            &self.keys.processing,
                            &self.keys.dead_letter,
                            &payload,
                            ListEnd::Tail,
                            None,
                        )
                        .await?;
                    continue;
                }
            };

            let key = self.timestamp_key(&job.job_id);
            let entered = self
                .store
                .get(&key)
                .await?
                .and_then(|v| v.parse::<i64>().ok());

            match entered {
                None => {
                    tracing::debug!(job_id = %job.job_id, "stamping untracked processing job");
                    self.store
                        .set_with_ttl(&key, &now.to_string(), self.processing_ttl)
                        .await?;
                }
                Some(entered) if now.saturating_sub(entered) > max_age_ms => {
                    let moved = self
                        .store
                        .relocate(
                            &self.keys.processing,
                            &self.keys.pending,
                            &payload,
                            ListEnd::Delivery,
                            Some(&key),
                        )
                        .await?;
                    if moved {
                        tracing::warn!(
                            job_id = %job.job_id,
                            age_ms = now - entered,
                            "requeued stale job"
                        );
                        requeued += 1;
                    }
                }
                Some(_) => {}
            }
        }

        Ok(requeued)
    }

    pub async fn queue_depth(&self) -> Result<usize, QueueError> {
        Ok(self.store.len(&self.keys.pending).await?)
    }

    pub async fn processing_depth(&self) -> Result<usize, QueueError> {
        Ok(self.store.len(&self.keys.processing).await?)
    }

    pub async fn dead_letter_depth(&self) -> Result<usize, QueueError> {
        Ok(self.store.len(&self.keys.dead_letter).await?)
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(QueueStats {
            pending: self.queue_depth().await?,
            processing: self.processing_depth().await?,
            dead_letter: self.dead_letter_depth().await?,
        })
    }

    /// Most recent dead-lettered payloads, newest first.
    pub async fn peek_dead_letter(&self, limit: usize) -> Result<Vec<String>, QueueError> {
        let mut payloads = self.store.range(&self.keys.dead_letter).await?;
        payloads.truncate(limit);
        Ok(payloads)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
