//! Key-value cache in front of the store.
//!
//! Holds `user:{jid}` snapshots with a TTL and `history:{jid}` lists of
//! recent turns. The cache is never the source of truth: every write lands
//! in the store first and cache failures degrade to store reads.

pub mod gateway;
pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

pub use gateway::CacheGateway;
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

/// Minimal string key-value interface with list support.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set with expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Push to the head of a list and trim it to `max_len`.
    async fn list_push_front(&self, key: &str, value: &str, max_len: usize)
    -> Result<(), CacheError>;

    /// Up to `limit` items from the head of a list (newest first).
    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, CacheError>;
}

pub fn user_key(jid: &str) -> String {
    format!("user:{jid}")
}

pub fn history_key(jid: &str) -> String {
    format!("history:{jid}")
}
