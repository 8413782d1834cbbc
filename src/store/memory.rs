// ABOUTME: In-process coordination store backed by a mutex-guarded map.
// ABOUTME: Used by tests and single-process runs; expiry follows the tokio clock.

use super::{CoordinationStore, ListEnd, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Lists keep their delivery end at the back of the deque.
#[derive(Debug, Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    values: HashMap<String, Entry>,
}

impl State {
    fn live_value(&mut self, key: &str) -> Option<&str> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| !e.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get(key).map(|e| e.value.as_str())
    }

    fn push(&mut self, list: &str, value: String, end: ListEnd) {
        let items = self.lists.entry(list.to_string()).or_default();
        match end {
            ListEnd::Tail => items.push_front(value),
            ListEnd::Delivery => items.push_back(value),
        }
    }

    fn remove_one(&mut self, list: &str, value: &str) -> bool {
        let Some(items) = self.lists.get_mut(list) else {
            return false;
        };
        match items.iter().position(|v| v == value) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }
    }
}

/// A [`CoordinationStore`] that lives inside this process.
///
/// Every operation runs under a single lock, which gives the same atomicity
/// the Redis scripts provide. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    pushed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_move(&self, src: &str, dst: &str) -> Option<String> {
        let mut state = self.state.lock();
        let value = state.lists.get_mut(src)?.pop_back()?;
        state.push(dst, value.clone(), ListEnd::Tail);
        Some(value)
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.state
            .lock()
            .push(list, value.to_string(), ListEnd::Tail);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register for wakeups before checking so a push between the
            // check and the wait is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_move(src, dst) {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return Ok(self.try_move(src, dst));
            }
        }
    }

    async fn remove(
        &self,
        list: &str,
        value: &str,
        key: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let removed = state.remove_one(list, value);
        if removed && let Some(key) = key {
            state.values.remove(key);
        }
        Ok(removed)
    }

    async fn relocate(
        &self,
        src: &str,
        dst: &str,
        value: &str,
        end: ListEnd,
        key: Option<&str>,
    ) -> Result<bool, StoreError> {
        let moved = {
            let mut state = self.state.lock();
            let moved = state.remove_one(src, value);
            if moved {
                state.push(dst, value.to_string(), end);
                if let Some(key) = key {
                    state.values.remove(key);
                }
            }
            moved
        };
        if moved {
            self.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn len(&self, list: &str) -> Result<usize, StoreError> {
        Ok(self.state.lock().lists.get(list).map_or(0, VecDeque::len))
    }

    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .lock()
            .lists
            .get(list)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().live_value(key).map(str::to_string))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.state.lock().values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().live_value(key).is_some())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        if state.live_value(key).is_some() {
            return Ok(false);
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        if state.live_value(key) != Some(expected) {
            return Ok(false);
        }
        state.values.remove(key);
        Ok(true)
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        if state.live_value(key) != Some(expected) {
            return Ok(false);
        }
        if let Some(entry) = state.values.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_are_fifo_from_the_delivery_end() {
        let store = MemoryStore::new();
        store.push("q", "a").await.unwrap();
        store.push("q", "b").await.unwrap();

        let first = store.blocking_move("q", "p", Duration::ZERO).await.unwrap();
        assert_eq!(first.as_deref(), Some("a"));
        assert_eq!(store.range("p").await.unwrap(), vec!["a".to_string()]);
        assert_eq!(store.len("q").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_move_times_out_on_empty_list() {
        let store = MemoryStore::new();
        let started = Instant::now();
        let value = store
            .blocking_move("q", "p", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(value.is_none());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_move_wakes_on_push() {
        let store = MemoryStore::new();
        let producer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            producer.push("q", "late").await.unwrap();
        });

        let value = store
            .blocking_move("q", "p", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire_with_the_clock() {
        let store = MemoryStore::new();
        assert!(
            store
                .set_if_absent("k", "v", Duration::from_secs(10))
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_if_absent("k", "w", Duration::from_secs(10))
                .await
                .unwrap()
        );

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!store.exists("k").await.unwrap());
        assert!(
            store
                .set_if_absent("k", "w", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn compare_then_act_requires_matching_value() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", "mine", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.delete_if_equals("k", "theirs").await.unwrap());
        assert!(
            !store
                .expire_if_equals("k", "theirs", Duration::from_secs(1))
                .await
                .unwrap()
        );
        assert!(store.delete_if_equals("k", "mine").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }
}
