//! TTL cache
//!
//! Each entry carries its own deadline. Expired entries are dropped when
//! they are read and swept on every insert; there is no background task.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<V> {
    default_ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`, evicting it if expired
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        // Sweep: keys that are never read again still expire
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Fresh value, or run `load` and store its result.
    ///
    /// The lock is not held while `load` runs, so two callers that both
    /// miss may both load; a caller that finds a fresh entry never does.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = load().await;
        self.set(key, value.clone());
        value
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.lock().remove(key).map(|entry| entry.value)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Stored entries, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_independently() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.set("short", 1);
        cache.set_with_ttl("long", 2, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_load_skips_loader_while_fresh() {
        let cache = TtlCache::new(Duration::from_secs(5));
        let counter = AtomicUsize::new(0);
        let loads = &counter;
        let load = move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            "value".to_string()
        };

        assert_eq!(cache.get_or_load("k", load).await, "value");
        assert_eq!(cache.get_or_load("k", load).await, "value");
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        cache.get_or_load("k", load).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_sweeps_expired_keys() {
        let cache = TtlCache::new(Duration::from_secs(5));
        for i in 0..50 {
            cache.set(format!("thought-{}", i), i);
            tokio::time::advance(Duration::from_secs(6)).await;
        }
        assert_eq!(cache.len(), 1);

        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = TtlCache::new(Duration::from_secs(5));
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.remove("a"), Some(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
