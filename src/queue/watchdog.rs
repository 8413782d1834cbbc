// ABOUTME: Periodic recovery of jobs abandoned by crashed workers.
// ABOUTME: Runs requeue_stale on an interval until shutdown.

use super::DeploymentQueue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Runs separately from workers; a worker never reclaims jobs inline.
#[derive(Debug, Clone)]
pub struct Watchdog {
    queue: Arc<DeploymentQueue>,
    interval: Duration,
    stale_after: Duration,
}

impl Watchdog {
    pub fn new(queue: Arc<DeploymentQueue>, interval: Duration, stale_after: Duration) -> Self {
        Self {
            queue,
            interval,
            stale_after,
        }
    }

    /// One sweep. Store errors are logged, not returned, so a flaky store
    /// does not stop the watchdog.
    pub async fn sweep(&self) -> usize {
        match self.queue.requeue_stale(self.stale_after).await {
            Ok(0) => 0,
            Ok(count) => {
                tracing::info!(count, "watchdog requeued stale jobs");
                count
            }
            Err(e) => {
                tracing::warn!("watchdog sweep failed: {}", e);
                0
            }
        }
    }

    /// Sweep every `interval` until `shutdown` resolves. Returns the total
    /// number of jobs requeued.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> usize {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut total = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("watchdog stopping");
                    return total;
                }
                _ = ticker.tick() => {
                    total += self.sweep().await;
                }
            }
        }
    }
}
