//! Expiring key-value cache backing the session tokens.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Key-value cache with per-entry expiry.
///
/// Expired entries must never be returned again, whether or not the
/// implementation has physically removed them yet.
#[async_trait]
pub trait SessionCache: Send + Sync + 'static {
    async fn is_alive(&self) -> bool {
        true
    }

    /// Returns `Ok(None)` if the key is absent or has expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value that expires `ttl` after this call. Overwrites.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Returns `Ok(true)` if a live entry was removed.
    async fn del(&self, key: &str) -> Result<bool>;
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process cache on a `DashMap`. Expired entries are dropped lazily on
/// access, or eagerly through [`MemoryCache::purge_expired`].
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Purges expired entries every `period`. Runs until the task is dropped.
    pub async fn run_sweeper(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = self.entries.len(), "expired sessions purged");
            }
        }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };

        if entry.is_expired() {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired());
            return Ok(None);
        }

        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get() {
        let cache = MemoryCache::new();
        cache
            .set("auth_x", "user-1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("auth_x").await.unwrap().as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = MemoryCache::new();
        assert!(cache.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_is_lazy_and_final() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
        assert!(!cache.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_del_reports_presence() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.del("k").await.unwrap());
        assert!(!cache.del("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache
            .set("short", "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        cache
            .set("long", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_reclaims_abandoned_entries() {
        let cache = Arc::new(MemoryCache::new());
        for i in 0..100 {
            cache
                .set(&format!("auth_{i}"), "user".to_string(), Duration::from_millis(10))
                .await
                .unwrap();
        }
        cache
            .set("auth_live", "user".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.len(), 101);

        let sweeper = tokio::spawn(cache.clone().run_sweeper(Duration::from_millis(20)));
        for _ in 0..50 {
            if cache.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        sweeper.abort();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("auth_live").await.unwrap().as_deref(), Some("user"));
    }
}
