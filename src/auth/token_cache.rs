//! Per-user cache of issued tokens, consulted on login to avoid re-issuing.
//!
//! Tokens stay valid on their own; dropping an entry only means the next
//! login signs a new one.

use std::collections::HashMap;

use parking_lot::RwLock;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::auth::jwt::IssuedToken;
use crate::config::TokenCacheConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: i64,
    username: String,
}

pub struct TokenCache {
    entries: RwLock<HashMap<CacheKey, IssuedToken>>,
    min_remaining: Duration,
}

impl TokenCache {
    pub fn new(min_remaining: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            min_remaining,
        }
    }

    /// `None` when caching is switched off.
    pub fn from_config(config: &TokenCacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(Duration::seconds(config.min_remaining_seconds)))
    }

    pub fn get(&self, user_id: i64, username: &str) -> Option<IssuedToken> {
        self.get_at(user_id, username, OffsetDateTime::now_utc())
    }

    /// Returns the entry only while it is unexpired and more than the minimum lifetime remains.
    /// Stale entries are dropped.
    pub fn get_at(&self, user_id: i64, username: &str, now: OffsetDateTime) -> Option<IssuedToken> {
        let key = CacheKey {
            user_id,
            username: username.to_string(),
        };
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if self.is_fresh(entry, now) => {
                    debug!(user_id, "token cache hit");
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        self.drop_if_stale(&key, now);
        None
    }

    /// Re-checks under the write lock, since a concurrent put may have replaced the entry.
    fn drop_if_stale(&self, key: &CacheKey, now: OffsetDateTime) {
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !self.is_fresh(entry, now)) {
            entries.remove(key);
            debug!(user_id = key.user_id, "token cache entry expired");
        }
    }

    fn is_fresh(&self, entry: &IssuedToken, now: OffsetDateTime) -> bool {
        entry.expires_at > now && entry.expires_at - now > self.min_remaining
    }

    pub fn put(&self, user_id: i64, username: &str, token: IssuedToken) {
        let key = CacheKey {
            user_id,
            username: username.to_string(),
        };
        self.entries.write().insert(key, token);
    }

    /// Drops every entry for the user, whatever username it was cached under.
    pub fn evict_user(&self, user_id: i64) {
        self.entries.write().retain(|key, _| key.user_id != user_id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
