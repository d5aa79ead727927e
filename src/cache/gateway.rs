//! Read-through user cache and write-through history log.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{KvCache, history_key, user_key};
use crate::config::CacheConfig;
use crate::error::DatabaseError;
use crate::outreach::model::{HistoryEntry, Message, User, UserPatch};
use crate::store::Database;

/// Owns consistency between the durable store and the cache.
///
/// The store is authoritative. Cache errors are logged and the call falls
/// back to the store; store errors are returned.
pub struct CacheGateway {
    db: Arc<dyn Database>,
    cache: Arc<dyn KvCache>,
    config: CacheConfig,
}

impl CacheGateway {
    pub fn new(db: Arc<dyn Database>, cache: Arc<dyn KvCache>, config: CacheConfig) -> Self {
        Self { db, cache, config }
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Cached user for `jid`, creating a `new` user on first contact.
    pub async fn get_user(&self, jid: &str) -> Result<User, DatabaseError> {
        match self.cache.get(&user_key(jid)).await {
            Ok(Some(raw)) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => return Ok(user),
                Err(e) => warn!(jid, error = %e, "Discarding undecodable cached user"),
            },
            Ok(None) => {}
            Err(e) => warn!(jid, error = %e, "User cache read failed, using store"),
        }

        let user = match self.db.get_user_by_jid(jid).await? {
            Some(user) => user,
            None => {
                let user = User::new(jid);
                self.db.insert_user(&user).await?;
                debug!(jid, user_id = %user.id, "Created user on first contact");
                user
            }
        };
        self.cache_user(&user).await;
        Ok(user)
    }

    /// Store lookup by id; refreshes the cache entry on success.
    pub async fn get_user_by_id(&self, id: Uuid) -> Result<User, DatabaseError> {
        let user = self
            .db
            .get_user(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: id.to_string(),
            })?;
        self.cache_user(&user).await;
        Ok(user)
    }

    /// Find a user by jid without creating one.
    pub async fn find_user(&self, jid: &str) -> Result<Option<User>, DatabaseError> {
        self.db.get_user_by_jid(jid).await
    }

    /// Insert a user created outside first contact (fan-out targets).
    pub async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.db.insert_user(user).await?;
        self.cache_user(user).await;
        Ok(())
    }

    /// Write to the store, then refresh the cache with the same expiry.
    pub async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<User, DatabaseError> {
        let user = self.db.update_user(id, patch).await?;
        self.cache_user(&user).await;
        Ok(user)
    }

    /// Persist, then mirror into the bounded history list.
    ///
    /// A store failure aborts before the cache is touched.
    pub async fn append_message(&self, message: &Message) -> Result<(), DatabaseError> {
        self.db.insert_message(message).await?;

        let entry = HistoryEntry::from(message);
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(jid = %message.jid, error = %e, "History entry encode failed");
                return Ok(());
            }
        };
        if let Err(e) = self
            .cache
            .list_push_front(&history_key(&message.jid), &raw, self.config.history_max)
            .await
        {
            warn!(jid = %message.jid, error = %e, "History cache push failed");
        }
        Ok(())
    }

    /// Recent turns, oldest first.
    ///
    /// An empty cache list is backfilled from the store.
    pub async fn get_history(&self, jid: &str) -> Result<Vec<HistoryEntry>, DatabaseError> {
        let key = history_key(jid);
        match self.cache.list_range(&key, self.config.history_max).await {
            Ok(raw) if !raw.is_empty() => {
                let mut entries: Vec<HistoryEntry> = raw
                    .iter()
                    .filter_map(|r| serde_json::from_str(r).ok())
                    .collect();
                entries.reverse();
                return Ok(entries);
            }
            Ok(_) => {}
            Err(e) => warn!(jid, error = %e, "History cache read failed, using store"),
        }

        let messages = self.db.recent_messages(jid, self.config.history_max).await?;
        let entries: Vec<HistoryEntry> = messages.iter().map(HistoryEntry::from).collect();

        for entry in &entries {
            let Ok(raw) = serde_json::to_string(entry) else {
                continue;
            };
            if let Err(e) = self
                .cache
                .list_push_front(&key, &raw, self.config.history_max)
                .await
            {
                warn!(jid, error = %e, "History backfill failed");
                break;
            }
        }
        debug!(jid, count = entries.len(), "History backfilled from store");
        Ok(entries)
    }

    async fn cache_user(&self, user: &User) {
        let raw = match serde_json::to_string(user) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(jid = %user.jid, error = %e, "User encode failed");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set_ex(&user_key(&user.jid), &raw, self.config.user_ttl)
            .await
        {
            warn!(jid = %user.jid, error = %e, "User cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::InMemoryCache;
    use crate::error::CacheError;
    use crate::outreach::model::{MessageRole, UserType};
    use crate::store::LibSqlBackend;

    async fn gateway_with(cache: Arc<dyn KvCache>, history_max: usize) -> CacheGateway {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        CacheGateway::new(
            db,
            cache,
            CacheConfig {
                redis_url: None,
                user_ttl: Duration::from_secs(3600),
                history_max,
            },
        )
    }

    /// Cache that fails every call.
    struct BrokenCache;

    #[async_trait]
    impl KvCache for BrokenCache {
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn list_push_front(&self, _: &str, _: &str, _: usize) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn list_range(&self, _: &str, _: usize) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
    }

    #[tokio::test]
    async fn first_contact_creates_new_user_once() {
        let gw = gateway_with(Arc::new(InMemoryCache::new()), 20).await;
        let a = gw.get_user("4155550100").await.unwrap();
        let b = gw.get_user("4155550100").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.user_type, UserType::New);
        assert!(gw.store().get_user_by_jid("4155550100").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_refreshes_cached_copy() {
        let gw = gateway_with(Arc::new(InMemoryCache::new()), 20).await;
        let user = gw.get_user("u1").await.unwrap();
        gw.update_user(user.id, &UserPatch::with_type(UserType::Candidate))
            .await
            .unwrap();
        let cached = gw.get_user("u1").await.unwrap();
        assert_eq!(cached.user_type, UserType::Candidate);
    }

    #[tokio::test]
    async fn history_is_bounded_and_oldest_first() {
        let gw = gateway_with(Arc::new(InMemoryCache::new()), 3).await;
        for i in 0..5 {
            gw.append_message(&Message::new("u1", MessageRole::User, UserType::New, format!("m{i}")))
                .await
                .unwrap();
        }
        let texts: Vec<_> = gw
            .get_history("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn empty_cache_backfills_from_store() {
        let cache = Arc::new(InMemoryCache::new());
        let gw = gateway_with(cache.clone(), 20).await;
        gw.append_message(&Message::new("u1", MessageRole::User, UserType::New, "hello"))
            .await
            .unwrap();
        gw.append_message(&Message::new("u1", MessageRole::Model, UserType::New, "hi there"))
            .await
            .unwrap();
        cache.delete(&history_key("u1")).await.unwrap();

        let history = gw.get_history("u1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "hello");
        assert_eq!(history[1].role, MessageRole::Model);

        // Repopulated newest-first.
        let raw = cache.list_range(&history_key("u1"), 10).await.unwrap();
        assert_eq!(raw.len(), 2);
        assert!(raw[0].contains("hi there"));
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_store() {
        let gw = gateway_with(Arc::new(BrokenCache), 20).await;
        let user = gw.get_user("u1").await.unwrap();
        gw.append_message(&Message::new("u1", MessageRole::User, UserType::New, "ping"))
            .await
            .unwrap();
        let history = gw.get_history("u1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(gw.get_user("u1").await.unwrap().id, user.id);
    }
}
