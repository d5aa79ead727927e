//! In-process cache used when no Redis URL is configured, and in tests.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::KvCache;
use crate::error::CacheError;

#[derive(Default)]
pub struct InMemoryCache {
    values: RwLock<HashMap<String, (String, Instant)>>,
    lists: RwLock<HashMap<String, VecDeque<String>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        {
            let values = self.values.read().await;
            match values.get(key) {
                Some((value, expires)) if *expires > Instant::now() => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired; drop it.
        self.values.write().await.remove(key);
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.values.write().await.remove(key);
        self.lists.write().await.remove(key);
        Ok(())
    }

    async fn list_push_front(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), CacheError> {
        let mut lists = self.lists.write().await;
        let list = lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        list.truncate(max_len);
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, CacheError> {
        let lists = self.lists.read().await;
        Ok(lists
            .get(key)
            .map(|l| l.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
