//! In-memory LRU cache of imported assets.

use std::any::Any;
use std::sync::Arc;

use hashlink::LruCache;

use crate::fs::name_key;
use crate::types::{CacheBudget, ContentType};

/// Cache key: the asset's type plus its case-folded logical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    content_type: ContentType,
    name: String,
}

impl AssetKey {
    pub fn new(content_type: ContentType, name: &str) -> Self {
        Self { content_type, name: name_key(name) }
    }

    pub fn of<T: 'static>(name: &str) -> Self {
        Self::new(ContentType::of::<T>(), name)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    cost: usize,
}

/// LRU keyed by [`AssetKey`] that evicts based on a byte budget. The cost of an
/// entry is the size of the source it was imported from.
#[derive(Debug)]
pub struct AssetCache {
    entries: LruCache<AssetKey, CacheEntry>,
    budget: CacheBudget,
    bytes_used: usize,
}

impl AssetCache {
    pub fn new(budget: CacheBudget) -> Self {
        Self { entries: LruCache::new_unbounded(), budget, bytes_used: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Fetch a cached asset, refreshing its recency.
    pub fn get<T: Any + Send + Sync>(&mut self, name: &str) -> Option<Arc<T>> {
        let entry = self.entries.get(&AssetKey::of::<T>(name))?;
        Arc::clone(&entry.value).downcast::<T>().ok()
    }

    /// Insert or replace an asset. Assets costing more than the whole budget are
    /// not stored.
    pub fn insert<T: Any + Send + Sync>(&mut self, name: &str, value: Arc<T>, cost: usize) {
        if cost > self.budget.bytes_max {
            return;
        }

        let key = AssetKey::of::<T>(name);
        if let Some(existing) = self.entries.remove(&key) {
            self.bytes_used = self.bytes_used.saturating_sub(existing.cost);
        }

        self.bytes_used += cost;
        self.entries.insert(key, CacheEntry { value: value as Arc<dyn Any + Send + Sync>, cost });
        self.evict_if_needed();
    }

    /// Drop every cached type stored under `name`.
    pub fn invalidate(&mut self, name: &str) {
        let folded = name_key(name);
        let stale: Vec<AssetKey> =
            self.entries.iter().filter(|(key, _)| key.name == folded).map(|(key, _)| key.clone()).collect();
        for key in stale {
            if let Some(entry) = self.entries.remove(&key) {
                self.bytes_used = self.bytes_used.saturating_sub(entry.cost);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes_used = 0;
    }

    fn evict_if_needed(&mut self) {
        while self.bytes_used > self.budget.bytes_max {
            let Some((_key, oldest)) = self.entries.remove_lru() else {
                break;
            };
            self.bytes_used = self.bytes_used.saturating_sub(oldest.cost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = AssetCache::new(CacheBudget { bytes_max: 64 });
        cache.insert("one", Arc::new(String::from("1")), 32);
        cache.insert("two", Arc::new(String::from("2")), 32);

        // Touch "one" so it becomes most recent.
        assert!(cache.get::<String>("ONE").is_some());

        cache.insert("three", Arc::new(String::from("3")), 32);

        assert!(cache.get::<String>("one").is_some());
        assert!(cache.get::<String>("two").is_none());
        assert!(cache.get::<String>("three").is_some());
        assert!(cache.bytes_used() <= 64);
    }

    #[test]
    fn types_do_not_collide() {
        let mut cache = AssetCache::new(CacheBudget::default());
        cache.insert("shared.bin", Arc::new(String::from("text")), 4);
        cache.insert("shared.bin", Arc::new(vec![1u8, 2]), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<String>("shared.bin").as_deref().map(String::as_str), Some("text"));
        assert_eq!(cache.get::<Vec<u8>>("shared.bin").as_deref(), Some(&vec![1, 2]));

        cache.invalidate("SHARED.BIN");
        assert!(cache.is_empty());
        assert_eq!(cache.bytes_used(), 0);
    }

    #[test]
    fn oversized_assets_are_skipped() {
        let mut cache = AssetCache::new(CacheBudget { bytes_max: 8 });
        cache.insert("big", Arc::new(0u64), 9);
        assert!(cache.is_empty());
    }
}
