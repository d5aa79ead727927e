//! Redis-backed cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::cache::KvCache;
use crate::error::CacheError;

pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Validate the URL. No connection is made until first use.
    pub fn new(connection_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn list_push_front(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        if max_len == 0 {
            return conn
                .del::<_, ()>(key)
                .await
                .map_err(|e| CacheError::Command(e.to_string()));
        }
        conn.ltrim::<_, ()>(key, 0, max_len as isize - 1)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, CacheError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        conn.lrange(key, 0, limit as isize - 1)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            RedisCache::new("not a url"),
            Err(CacheError::Connection(_))
        ));
    }

    #[test]
    fn accepts_redis_url_without_connecting() {
        assert!(RedisCache::new("redis://127.0.0.1:6399/").is_ok());
    }
}
