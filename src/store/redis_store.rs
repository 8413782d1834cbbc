// ABOUTME: Redis-backed coordination store for multi-process deployments.
// ABOUTME: Compare-then-act and multi-key moves run as server-side Lua scripts.

use super::{CoordinationStore, ListEnd, StoreError};
use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, Script};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;

/// LREM + optional DEL in one step.
const REMOVE_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed > 0 and #KEYS > 1 then
  redis.call('DEL', KEYS[2])
end
return removed
"#;

/// LREM + push + optional DEL in one step. ARGV[2] is LPUSH or RPUSH.
const RELOCATE_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed > 0 then
  redis.call(ARGV[2], KEYS[2], ARGV[1])
  if #KEYS > 2 then
    redis.call('DEL', KEYS[3])
  end
end
return removed
"#;

const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

const EXPIRE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

/// A [`CoordinationStore`] backed by a single Redis instance.
///
/// Lock semantics are the single-node form of Redlock: correct against one
/// Redis primary, not across a replicated failover.
pub struct RedisStore {
    conn: MultiplexedConnection,
    // BLMOVE parks its connection; keep it off the shared one.
    blocking: Mutex<MultiplexedConnection>,
    remove_script: Script,
    relocate_script: Script,
    delete_script: Script,
    expire_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let blocking = client.get_multiplexed_async_connection().await?;
        tracing::debug!("connected to redis coordination store");

        Ok(Self {
            conn,
            blocking: Mutex::new(blocking),
            remove_script: Script::new(REMOVE_SCRIPT),
            relocate_script: Script::new(RELOCATE_SCRIPT),
            delete_script: Script::new(DELETE_IF_EQUALS_SCRIPT),
            expire_script: Script::new(EXPIRE_IF_EQUALS_SCRIPT),
        })
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _len: i64 = ::redis::cmd("LPUSH")
            .arg(list)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.blocking.lock().await;
        // A zero timeout means "block forever" to Redis; never ask for that.
        let seconds = timeout.as_secs_f64().max(0.01);
        let value: Option<String> = ::redis::cmd("BLMOVE")
            .arg(src)
            .arg(dst)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(seconds)
            .query_async(&mut *conn)
            .await?;
        Ok(value)
    }

    async fn remove(
        &self,
        list: &str,
        value: &str,
        key: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.remove_script.key(list);
        if let Some(key) = key {
            invocation.key(key);
        }
        let removed: i64 = invocation.arg(value).invoke_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn relocate(
        &self,
        src: &str,
        dst: &str,
        value: &str,
        end: ListEnd,
        key: Option<&str>,
    ) -> Result<bool, StoreError> {
        let push = match end {
            ListEnd::Tail => "LPUSH",
            ListEnd::Delivery => "RPUSH",
        };
        let mut conn = self.conn.clone();
        let mut invocation = self.relocate_script.key(src);
        invocation.key(dst);
        if let Some(key) = key {
            invocation.key(key);
        }
        let moved: i64 = invocation
            .arg(value)
            .arg(push)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved > 0)
    }

    async fn len(&self, list: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = ::redis::cmd("LLEN").arg(list).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn range(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = ::redis::cmd("LRANGE")
            .arg(list)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = ::redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let reply: String = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        if reply != "OK" {
            return Err(StoreError::UnexpectedReply {
                key: key.to_string(),
                detail: reply,
            });
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = ::redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .delete_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let updated: i64 = self
            .expire_script
            .key(key)
            .arg(expected)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(updated > 0)
    }
}
