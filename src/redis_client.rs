use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

/// Thin JSON-over-Redis wrapper used by the seat map cache.
#[derive(Clone)]
pub struct RedisClient {
    conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(RedisClient { conn })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> redis::RedisResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> redis::RedisResult<()> {
        let payload = serde_json::to_string(value).map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "serialize", e.to_string()))
        })?;
        let mut conn = self.conn.clone();
        conn.set_ex(key, payload, ttl_seconds).await
    }

    pub async fn delete(&self, key: &str) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await
    }

    /// Current value of an integer counter; a missing key reads as zero.
    pub async fn counter(&self, key: &str) -> redis::RedisResult<u64> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }

    pub async fn increment(&self, key: &str) -> redis::RedisResult<u64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1u64).await
    }

    pub async fn ping(&self) -> redis::RedisResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async(&mut conn).await
    }
}
