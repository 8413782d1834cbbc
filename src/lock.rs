// ABOUTME: Store-backed mutual exclusion so one deployment runs per target at a time.
// ABOUTME: Single-node Redlock: set-if-absent acquire, compare-then-act release and extend.

use crate::store::{CoordinationStore, StoreError};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another holder kept the lock for the whole acquisition window.
    #[error("lock {name} still held by another worker after {waited:?}")]
    Contended { name: String, waited: Duration },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Proof of a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub lock_name: String,
    pub token: String,
    pub ttl: Duration,
}

/// A named lock in the coordination store.
///
/// Correct only against a single store instance. A holder whose critical
/// section outlives `ttl` loses exclusivity silently; long-running holders
/// should use [`keep_alive`](Self::keep_alive).
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    name: String,
    key: String,
    ttl: Duration,
    token: Mutex<String>,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CoordinationStore>, name: impl Into<String>, ttl: Duration) -> Self {
        let name = name.into();
        Self {
            store,
            key: format!("lock:{name}"),
            name,
            ttl,
            token: Mutex::new(new_token()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The token this instance will hold (or holds) the lock with.
    pub fn handle(&self) -> LockHandle {
        LockHandle {
            lock_name: self.name.clone(),
            token: self.token.lock().clone(),
            ttl: self.ttl,
        }
    }

    /// Single non-blocking attempt.
    pub async fn acquire(&self) -> Result<bool, LockError> {
        let token = new_token();
        let acquired = self
            .store
            .set_if_absent(&self.key, &token, self.ttl)
            .await?;
        if acquired {
            tracing::debug!(lock = %self.name, "lock acquired");
            *self.token.lock() = token;
        }
        Ok(acquired)
    }

    /// Release if still held by this instance's token.
    ///
    /// `false` means the lock expired and may belong to someone else; this
    /// worker no longer has exclusivity.
    pub async fn release(&self) -> Result<bool, LockError> {
        let token = self.token.lock().clone();
        let released = self.store.delete_if_equals(&self.key, &token).await?;
        if released {
            tracing::debug!(lock = %self.name, "lock released");
        } else {
            tracing::warn!(lock = %self.name, "lock was no longer held at release");
        }
        Ok(released)
    }

    /// Refresh the expiry to `ttl` (or the lock's own ttl) if still held.
    pub async fn extend(&self, ttl: Option<Duration>) -> Result<bool, LockError> {
        let token = self.token.lock().clone();
        let ttl = ttl.unwrap_or(self.ttl);
        Ok(self.store.expire_if_equals(&self.key, &token, ttl).await?)
    }

    /// Whether anyone holds the lock.
    pub async fn is_locked(&self) -> Result<bool, LockError> {
        Ok(self.store.exists(&self.key).await?)
    }

    /// Retry [`acquire`](Self::acquire) every `retry_interval` until `timeout`.
    pub async fn acquire_within(
        &self,
        timeout: Duration,
        retry_interval: Duration,
    ) -> Result<(), LockError> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            if self.acquire().await? {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Contended {
                    name: self.name.clone(),
                    waited: now - started,
                });
            }
            tokio::time::sleep(retry_interval.min(deadline - now)).await;
        }
    }

    /// Drive `fut` to completion, extending the lock every `interval`.
    ///
    /// A failed extend is logged and the future keeps running.
    pub async fn keep_alive<F: Future>(&self, interval: Duration, fut: F) -> F::Output {
        tokio::pin!(fut);
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                out = &mut fut => return out,
                _ = ticker.tick() => match self.extend(None).await {
                    Ok(true) => tracing::trace!(lock = %self.name, "lock extended"),
                    Ok(false) => tracing::warn!(lock = %self.name, "lock lost while held"),
                    Err(e) => tracing::warn!(lock = %self.name, "failed to extend lock: {}", e),
                },
            }
        }
    }

    /// Acquire within `timeout`, run `f` with the lock kept alive, then
    /// release on every exit path. A panic in `f` is resumed after release.
    pub async fn locked<F, Fut>(
        &self,
        timeout: Duration,
        retry_interval: Duration,
        f: F,
    ) -> Result<Fut::Output, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.acquire_within(timeout, retry_interval).await?;

        let interval = (self.ttl / 3).max(Duration::from_millis(10));
        let outcome = AssertUnwindSafe(self.keep_alive(interval, f()))
            .catch_unwind()
            .await;

        if let Err(e) = self.release().await {
            tracing::warn!(lock = %self.name, "failed to release lock: {}", e);
        }

        match outcome {
            Ok(out) => Ok(out),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// `<hostname>:<pid>:<uuid>`, unique per acquisition.
fn new_token() -> String {
    format!(
        "{}:{}:{}",
        gethostname::gethostname().to_string_lossy(),
        std::process::id(),
        uuid::Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_identifies_holder() {
        let token = new_token();
        let parts: Vec<_> = token.rsplitn(3, ':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], std::process::id().to_string());
        assert!(uuid::Uuid::parse_str(parts[0]).is_ok());
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(new_token(), new_token());
    }
}
