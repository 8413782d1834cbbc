// ABOUTME: Coordination store abstraction shared by the queue and the lock.
// ABOUTME: Every method with a correctness requirement is one atomic store-side step.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Errors from the coordination store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported store url: {0}")]
    UnsupportedUrl(String),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("unexpected reply for {key}: {detail}")]
    UnexpectedReply { key: String, detail: String },
}

/// Which end of a list a value is pushed onto.
///
/// Lists are consumed from the `Delivery` end; `Tail` is where new work
/// waits its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    /// Joins the back of the line (Redis `LPUSH`).
    Tail,
    /// Delivered next (Redis `RPUSH`).
    Delivery,
}

/// Atomic primitives the orchestration core needs from a shared store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Push a value onto the tail of a list.
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Atomically pop the next value from `src` and push it onto the tail of
    /// `dst`, waiting up to `timeout` for `src` to become non-empty.
    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// Atomically remove one exact occurrence of `value` from `list` and, if
    /// it was present, delete `key`. Returns whether the value was found.
    async fn remove(&self, list: &str, value: &str, key: Option<&str>)
    -> Result<bool, StoreError>;

    /// Atomically remove one exact occurrence of `value` from `src`, push it
    /// onto `dst` at `end`, and delete `key`. Nothing changes if `value` is
    /// not in `src`.
    async fn relocate(
        &self,
        src: &str,
        dst: &str,
        value: &str,
        end: ListEnd,
        key: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Length of a list (zero if absent).
    async fn len(&self, list: &str) -> Result<usize, StoreError>;

    /// All values of a list, delivery end last.
    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
    -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Set `key` to `value` with expiry only if `key` is absent.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Delete `key` only if it currently holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Reset the expiry of `key` only if it currently holds `expected`.
    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}

/// Open a store from a URL: `memory://` or `redis://…`/`rediss://…`.
pub async fn connect(url: &str) -> Result<Arc<dyn CoordinationStore>, StoreError> {
    if url.starts_with("memory://") {
        tracing::debug!("using in-process coordination store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    if url.starts_with("redis://") || url.starts_with("rediss://") {
        let store = RedisStore::connect(url).await?;
        return Ok(Arc::new(store));
    }

    Err(StoreError::UnsupportedUrl(url.to_string()))
}
