//! In-memory access-token cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::CachePolicy;
use crate::models::token::{CachedToken, TokenPair};

/// Key under which the single-slot policy stores its only entry.
const SINGLE_SLOT: &str = "";

/// Access-token cache keyed by user id.
///
/// With [`CachePolicy::SingleSlot`] every `put` overwrites the one shared
/// entry, evicting whichever user held it.
pub struct TokenCache {
    policy: CachePolicy,
    entries: DashMap<String, CachedToken>,
}

impl TokenCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn slot<'a>(&self, user_id: &'a str) -> &'a str {
        match self.policy {
            CachePolicy::PerUser => user_id,
            CachePolicy::SingleSlot => SINGLE_SLOT,
        }
    }

    /// Unexpired entry for `user_id`.
    pub fn get(&self, user_id: &str) -> Option<CachedToken> {
        let now = Utc::now();
        self.entries
            .get(self.slot(user_id))
            .filter(|entry| entry.is_valid_for(user_id, now))
            .map(|entry| entry.value().clone())
    }

    /// Cache `tokens` for `user_id`, valid for `ttl` from now.
    pub fn put(&self, user_id: &str, tokens: TokenPair, ttl: Duration) -> CachedToken {
        let entry = CachedToken {
            user_id: user_id.to_string(),
            tokens,
            expires_at: expiry_after(Utc::now(), ttl),
        };
        self.insert(entry.clone());
        entry
    }

    /// Store a prepared entry as-is.
    pub fn insert(&self, entry: CachedToken) {
        let slot = self.slot(&entry.user_id).to_string();
        self.entries.insert(slot, entry);
    }

    /// Drop the entry held for `user_id`. Returns whether one was removed.
    pub fn invalidate(&self, user_id: &str) -> bool {
        self.entries
            .remove_if(self.slot(user_id), |_, entry| entry.user_id == user_id)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Evict expired entries.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| now < entry.expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a task purging expired entries every `period`.
    pub fn spawn_purge_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                cache.purge_expired();
            }
        })
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str) -> TokenPair {
        TokenPair {
            access_token: access.into(),
            refresh_token: Some(format!("{access}-refresh")),
        }
    }

    const TTL: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn hit_for_same_user_within_ttl() {
        let cache = TokenCache::new(CachePolicy::PerUser);
        cache.put("u1", pair("at1"), TTL);
        assert_eq!(cache.get("u1").unwrap().tokens.access_token, "at1");
        assert!(cache.get("u2").is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = TokenCache::new(CachePolicy::PerUser);
        cache.insert(CachedToken {
            user_id: "u1".into(),
            tokens: pair("old"),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        });
        assert!(cache.get("u1").is_none());
        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn per_user_entries_coexist() {
        let cache = TokenCache::new(CachePolicy::PerUser);
        cache.put("a", pair("at-a"), TTL);
        cache.put("b", pair("at-b"), TTL);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().tokens.access_token, "at-a");
    }

    #[test]
    fn single_slot_put_evicts_other_user() {
        let cache = TokenCache::new(CachePolicy::SingleSlot);
        cache.put("a", pair("at-a"), TTL);
        cache.put("b", pair("at-b"), TTL);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b").unwrap().tokens.access_token, "at-b");
    }

    #[test]
    fn single_slot_invalidate_only_removes_owner() {
        let cache = TokenCache::new(CachePolicy::SingleSlot);
        cache.put("a", pair("at-a"), TTL);
        assert!(!cache.invalidate("b"));
        assert!(cache.invalidate("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn huge_ttl_saturates() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test]
    async fn purge_task_runs() {
        let cache = Arc::new(TokenCache::new(CachePolicy::PerUser));
        cache.insert(CachedToken {
            user_id: "u1".into(),
            tokens: pair("old"),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        });
        let handle = cache.spawn_purge_task(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert!(cache.is_empty());
    }
}
