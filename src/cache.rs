use crate::core::viewport::ViewportBucket;
use crate::data::point::DataVersion;
use crate::spatial::query::QueryResult;
use instant::Instant;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Cache key: data version plus viewport class
pub type CacheKey = (DataVersion, ViewportBucket);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: Arc<QueryResult>,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
}

/// Time-boxed memo of resolved query results.
///
/// Bounded by an LRU so long sessions over many viewports stay small. Owned
/// by one engine; there is no global instance.
#[derive(Debug)]
pub struct ResultCache {
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<QueryResult>> {
        self.get_at(key, Instant::now())
    }

    /// Looks up `key` as of `now`; expired entries are evicted on sight.
    pub fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<Arc<QueryResult>> {
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.result.clone()));
        let fresh = match lookup {
            Some((true, result)) => Some(result),
            Some((false, _)) => {
                self.entries.pop(key);
                self.stats.expired += 1;
                None
            }
            None => None,
        };

        match &fresh {
            Some(_) => {
                self.stats.hits += 1;
                log::trace!("cache hit for {:?}", key);
            }
            None => {
                self.stats.misses += 1;
                log::trace!("cache miss for {:?}", key);
            }
        }
        fresh
    }

    pub fn set(&mut self, key: CacheKey, value: Arc<QueryResult>, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&mut self, key: CacheKey, value: Arc<QueryResult>, ttl: Duration, now: Instant) {
        self.entries.put(
            key,
            CacheEntry {
                result: value,
                expires_at: now + ttl,
            },
        );
    }

    /// Drops every entry. Called whenever the data version changes.
    pub fn invalidate_all(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("invalidating {} cached results", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
