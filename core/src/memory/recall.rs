//! Memory recall with request de-duplication
//!
//! Concurrent recalls for the same `(query, limit)` share one in-flight
//! search; the result is kept for the lifetime of the cache. Search
//! failures resolve to an empty result.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::SearchError;
use crate::runtime::Capability;

/// One recalled memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    /// Relevance, higher is better
    #[serde(default)]
    pub score: f32,
}

impl SearchHit {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            score,
        }
    }
}

/// External semantic-search collaborator
#[async_trait::async_trait]
pub trait SemanticSearch: Capability {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

type RecallKey = (String, usize);

pub struct RecallCache {
    search: Arc<dyn SemanticSearch>,
    entries: Mutex<HashMap<RecallKey, Arc<OnceCell<Vec<SearchHit>>>>>,
}

impl RecallCache {
    pub fn new(search: Arc<dyn SemanticSearch>) -> Self {
        Self {
            search,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Recall memories for `query`. The collaborator is called at most once
    /// per distinct key.
    pub async fn recall(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let key = (query.trim().to_string(), limit);
        let cell = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(key).or_default())
        };

        cell.get_or_init(|| self.search_or_empty(query.trim(), limit))
            .await
            .clone()
    }

    /// Bypass de-duplication; failures still resolve to empty
    pub async fn search_or_empty(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        match self.search.search(query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(query, limit, error = %e, "memory recall failed, continuing without memories");
                Vec::new()
            }
        }
    }

    /// Distinct keys seen so far
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSearch {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSearch {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl Capability for CountingSearch {
        fn name(&self) -> &'static str {
            "counting-search"
        }
    }

    #[async_trait::async_trait]
    impl SemanticSearch for CountingSearch {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(SearchError::new("index offline"));
            }
            Ok((0..limit).map(|i| SearchHit::new(format!("{} #{}", query, i), 1.0)).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_recalls_share_one_search() {
        let search = CountingSearch::new(false);
        let cache = RecallCache::new(search.clone());

        let (a, b, c) = tokio::join!(
            cache.recall("moths", 2),
            cache.recall("moths", 2),
            cache.recall(" moths ", 2),
        );

        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
        assert_eq!(b, c);

        cache.recall("moths", 2).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_limits_are_distinct_keys() {
        let search = CountingSearch::new(false);
        let cache = RecallCache::new(search.clone());

        cache.recall("moths", 1).await;
        cache.recall("moths", 3).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resolves_to_empty_and_is_cached() {
        let search = CountingSearch::new(true);
        let cache = RecallCache::new(search.clone());

        assert!(cache.recall("anything", 5).await.is_empty());
        assert!(cache.recall("anything", 5).await.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        cache.clear();
        assert!(cache.is_empty());
        cache.recall("anything", 5).await;
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }
}
