//! Redis-backed result cache and leaderboard counters.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::application::ports::{CacheStore, CacheStoreError, CounterError, CounterStore};
use crate::infra::error::InfraError;

/// Shared multiplexed connection. Cloning is cheap and every call works on its own handle.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(url)?;
        let mut connection = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        info!(target = "insights::redis", "connected to redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let mut connection = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(CacheStoreError::unavailable)
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl_seconds: u64,
    ) -> Result<(), CacheStoreError> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut connection)
            .await
            .map_err(CacheStoreError::unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, member: &str, amount: u64) -> Result<(), CounterError> {
        let mut connection = self.connection.clone();
        let _: f64 = redis::cmd("ZINCRBY")
            .arg(key)
            .arg(amount)
            .arg(member)
            .query_async(&mut connection)
            .await
            .map_err(CounterError::unavailable)?;
        Ok(())
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<(), CounterError> {
        let mut connection = self.connection.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut connection)
            .await
            .map_err(CounterError::unavailable)?;
        Ok(())
    }

    async fn top(&self, key: &str, limit: usize) -> Result<Vec<(String, u64)>, CounterError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut connection = self.connection.clone();
        let scored: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(0)
            .arg(limit - 1)
            .arg("WITHSCORES")
            .query_async(&mut connection)
            .await
            .map_err(CounterError::unavailable)?;

        Ok(scored
            .into_iter()
            .map(|(member, score)| (member, score.max(0.0) as u64))
            .collect())
    }
}
