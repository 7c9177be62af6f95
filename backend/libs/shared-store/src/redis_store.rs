//! Redis backend.
//!
//! Commands go through a [`ConnectionManager`], a multiplexed connection that
//! reconnects on its own; cloning it per command is cheap. Every command runs
//! under `command_timeout` and a timeout surfaces as [`StoreError::Timeout`].

use crate::backend::{KeyTtl, SharedStore};
use crate::error::{StoreError, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisResult, Script};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Deletes KEYS[1] only when it holds ARGV[1]. Returns 1 when deleted.
static COMPARE_AND_DELETE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
",
    )
});

/// INCR, attaching the window expiry only when the counter was just created.
static INCREMENT_IN_WINDOW: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
",
    )
});

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    /// Upper bound for a single command, including waiting for a reconnect.
    pub command_timeout: Duration,
    /// Upper bound for establishing the first connection at startup.
    pub connect_timeout: Duration,
}

impl RedisStoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_timeout: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl RedisStore {
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self> {
        let info: ConnectionInfo = config
            .url
            .as_str()
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;

        let tls = matches!(info.addr, ConnectionAddr::TcpTls { .. });
        let client = Client::open(info).context("failed to construct Redis client")?;

        let manager = timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .context("timed out connecting to Redis")?
            .context("failed to initialize Redis connection manager")?;

        info!(
            tls,
            command_timeout_ms = config.command_timeout.as_millis() as u64,
            "Redis store connected"
        );

        Ok(Self {
            manager,
            command_timeout: config.command_timeout,
        })
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(op, error = %err, "Redis command failed");
                Err(StoreError::from(err))
            }
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.command_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                Err(StoreError::Timeout {
                    op,
                    timeout: self.command_timeout,
                })
            }
        }
    }
}

/// Redis expiries are whole seconds and must be positive.
fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        self.run("GET", async move {
            redis::cmd("GET")
                .arg(key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        self.run("SET", async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(expiry_secs(ttl))
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .run("DEL", async move {
                redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.manager.clone();
        self.run("INCR", async move {
            redis::cmd("INCR").arg(key).query_async(&mut conn).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let applied: i64 = self
            .run("EXPIRE", async move {
                redis::cmd("EXPIRE")
                    .arg(key)
                    .arg(expiry_secs(ttl))
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(applied == 1)
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let mut conn = self.manager.clone();
        let reply: i64 = self
            .run("TTL", async move {
                redis::cmd("TTL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(KeyTtl::from_redis_reply(reply))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let deleted: i64 = self
            .run("EVALSHA compare_and_delete", async move {
                COMPARE_AND_DELETE
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(deleted == 1)
    }

    async fn increment_in_window(&self, key: &str, window: Duration) -> StoreResult<i64> {
        let mut conn = self.manager.clone();
        self.run("EVALSHA increment_in_window", async move {
            INCREMENT_IN_WINDOW
                .key(key)
                .arg(expiry_secs(window))
                .invoke_async(&mut conn)
                .await
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let pong: String = self
            .run("PING", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Protocol(format!("unexpected PING reply: {pong}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_rounds_up_to_whole_seconds() {
        assert_eq!(expiry_secs(Duration::from_secs(30)), 30);
        assert_eq!(expiry_secs(Duration::from_millis(1500)), 2);
        assert_eq!(expiry_secs(Duration::from_millis(10)), 1);
        assert_eq!(expiry_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_default_config_timeouts() {
        let config = RedisStoreConfig::new("redis://127.0.0.1:6379");
        assert_eq!(config.command_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let config = RedisStoreConfig::new("not a redis url");
        assert!(RedisStore::connect(&config).await.is_err());
    }
}
