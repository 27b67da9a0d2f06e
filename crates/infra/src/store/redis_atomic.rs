//! Redis-backed atomic store.
//!
//! - **Scalars**: `GET`/`SET`
//! - **Ordered multimap**: sorted sets (`ZADD`, `ZRANGE`/`ZREVRANGE`,
//!   `ZRANGEBYSCORE`/`ZREVRANGEBYSCORE ... LIMIT`)
//! - **Atomic scripts**: Lua via `EVALSHA`, falling back to `EVAL` when the
//!   server has not cached the script yet
//!
//! A single multiplexed connection is shared by all callers; Redis executes
//! each script to completion before serving any other command, which is what
//! makes the ledger mutations atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, instrument};

use super::r#trait::{AtomicStore, StoreError, StoreResult};
use super::script::{self, LedgerScript};

#[derive(Clone)]
pub struct RedisAtomicStore {
    conn: MultiplexedConnection,
    scripts: Arc<HashMap<&'static str, redis::Script>>,
}

impl std::fmt::Debug for RedisAtomicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAtomicStore")
            .field("scripts", &self.scripts.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RedisAtomicStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let scripts = script::ALL
            .iter()
            .map(|s| (s.name, redis::Script::new(s.source)))
            .collect();

        Ok(Self {
            conn,
            scripts: Arc::new(scripts),
        })
    }
}

fn map_redis_error(op: &str, e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Connection(format!("{op} failed: {e}"))
    } else {
        StoreError::Command(format!("{op} failed: {e}"))
    }
}

/// Flatten one script reply element into a string.
fn value_to_string(value: &redis::Value) -> StoreResult<String> {
    match value {
        redis::Value::Int(i) => Ok(i.to_string()),
        redis::Value::Data(data) => Ok(String::from_utf8_lossy(data).to_string()),
        redis::Value::Status(s) => Ok(s.clone()),
        redis::Value::Okay => Ok("OK".to_string()),
        other => Err(StoreError::Malformed(format!(
            "unexpected script reply element: {other:?}"
        ))),
    }
}

#[async_trait]
impl AtomicStore for RedisAtomicStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("GET", e))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("SET", e))
    }

    async fn ordered_append(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("ZADD", e))?;
        Ok(())
    }

    async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        reverse: bool,
    ) -> StoreResult<Vec<String>> {
        let command = if reverse { "ZREVRANGE" } else { "ZRANGE" };
        let mut conn = self.conn.clone();
        redis::cmd(command)
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(command, e))
    }

    async fn range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        reverse: bool,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>> {
        let mut cmd = if reverse {
            let mut cmd = redis::cmd("ZREVRANGEBYSCORE");
            cmd.arg(key).arg(max).arg(min);
            cmd
        } else {
            let mut cmd = redis::cmd("ZRANGEBYSCORE");
            cmd.arg(key).arg(min).arg(max);
            cmd
        };
        if let Some(limit) = limit {
            cmd.arg("LIMIT").arg(0).arg(limit);
        }

        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("range by score", e))
    }

    #[instrument(skip(self, args), fields(script = %script.qualified_name()), err)]
    async fn execute_atomic(
        &self,
        script: &LedgerScript,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<Vec<String>> {
        let compiled = self.scripts.get(script.name).ok_or_else(|| StoreError::Script {
            script: script.name,
            message: "script not registered".to_string(),
        })?;

        let mut invocation = compiled.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let reply: Vec<redis::Value> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| match map_redis_error("EVALSHA", e) {
                StoreError::Command(message) => StoreError::Script {
                    script: script.name,
                    message,
                },
                other => other,
            })?;

        debug!(elements = reply.len(), "script replied");
        reply.iter().map(value_to_string).collect()
    }
}
