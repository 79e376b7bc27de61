//! Small bounded time-to-live cache for content-addressed documents.
//!
//! Content behind an identifier never changes, so concurrent inserts for the
//! same key are harmless and the last write simply wins.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

pub struct TtlCache<V> {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        TtlCache {
            ttl,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        let (inserted, value) = entries.get(key)?;
        if inserted.elapsed() < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, (inserted, _))| *inserted)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(key, (Instant::now(), value));
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_get_insert() {
        let cache = TtlCache::new(Duration::from_secs(60), 8);
        assert_eq!(cache.get("a").await, None);

        cache.insert("a", 1).await;
        assert_eq!(cache.get("a").await, Some(1));

        // last write wins
        cache.insert("a", 2).await;
        assert_eq!(cache.get("a").await, Some(2));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = TtlCache::new(Duration::from_millis(20), 8);
        cache.insert("a", "doc").await;
        assert_eq!(cache.get("a").await, Some("doc"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert("b", 2).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_key() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60), 4));

        let writers = (0..16).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.insert("cid", "same content").await })
        });
        for w in writers {
            w.await.unwrap();
        }

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("cid").await, Some("same content"));
    }
}
