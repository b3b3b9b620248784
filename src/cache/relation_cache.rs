use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::key::RelationCacheKey;
use crate::cache::transaction;
use crate::error::Result;
use crate::graph::{Relation, RelationKey};

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Loads currently computing one key, and how many times that key was
/// evicted since the first of them started.
#[derive(Default)]
struct InFlight {
    loaders: usize,
    evictions: u64,
}

struct Entries {
    lru: LruCache<RelationCacheKey, Vec<Relation>>,
    in_flight: HashMap<RelationCacheKey, InFlight>,
}

impl Entries {
    fn invalidate(&mut self, key: &RelationCacheKey) {
        self.lru.pop(key);
        if let Some(load) = self.in_flight.get_mut(key) {
            load.evictions += 1;
        }
    }
}

/// Registration of one load in the in-flight table. Dropping it, including
/// when the load future is cancelled, deregisters the load.
struct LoadGuard<'a> {
    entries: &'a Mutex<Entries>,
    key: RelationCacheKey,
    /// Eviction count of the key when this load started.
    seen: u64,
}

impl<'a> LoadGuard<'a> {
    fn start(entries: &'a Mutex<Entries>, key: RelationCacheKey) -> Self {
        let mut guard = entries.lock().unwrap();
        let load = guard.in_flight.entry(key.clone()).or_default();
        load.loaders += 1;
        let seen = load.evictions;
        drop(guard);
        Self { entries, key, seen }
    }

    /// Cache `value` unless the key was evicted while it was computed.
    fn finish(self, value: Vec<Relation>) {
        let mut entries = self.entries.lock().unwrap();
        let evicted = entries
            .in_flight
            .get(&self.key)
            .map_or(true, |load| load.evictions != self.seen);
        if evicted {
            log::trace!("Eviction raced with load of {:?}, not caching", self.key);
        } else {
            entries.lru.put(self.key.clone(), value);
        }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(load) = entries.in_flight.get_mut(&self.key) {
            load.loaders -= 1;
            if load.loaders == 0 {
                entries.in_flight.remove(&self.key);
            }
        }
    }
}

/// Thread-safe LRU cache of relation lookups, keyed by query shape.
///
/// Reads inside an open write transaction bypass the cache entirely, and
/// evictions issued inside one are deferred until it ends. A load that
/// overlaps an eviction of its own key is returned but not cached; evictions
/// of other keys do not affect it. Cloning is cheap and clones share the
/// same entries.
#[derive(Clone)]
pub struct RelationCache {
    entries: Arc<Mutex<Entries>>,
    counters: Arc<Counters>,
    enabled: bool,
}

impl RelationCache {
    /// Create a cache holding at most `capacity` query results (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(Entries {
                lru: LruCache::new(cap),
                in_flight: HashMap::new(),
            })),
            counters: Arc::new(Counters::default()),
            enabled: true,
        }
    }

    /// Pass-through cache: every lookup computes.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn cached(&self, key: &RelationCacheKey) -> Option<Vec<Relation>> {
        self.entries.lock().unwrap().lru.get(key).cloned()
    }

    /// Return the cached value for `key`, or run `compute` and cache its result.
    pub async fn get_or_compute<F, Fut>(&self, key: RelationCacheKey, compute: F) -> Result<Vec<Relation>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Relation>>>,
    {
        if !self.enabled {
            return compute().await;
        }
        if transaction::in_transaction() {
            log::trace!("Cache bypass inside transaction: {:?}", key);
            return compute().await;
        }

        if let Some(hit) = self.cached(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("Cache hit: {:?}", key);
            return Ok(hit);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let load = LoadGuard::start(&self.entries, key);
        let value = compute().await?;
        load.finish(value.clone());
        Ok(value)
    }

    /// Evict `keys`, immediately or when the enclosing transaction ends.
    pub fn evict(&self, keys: Vec<RelationCacheKey>) {
        if !self.enabled || keys.is_empty() {
            return;
        }
        if transaction::in_transaction() {
            log::debug!("Deferring eviction of {} cache keys until transaction end", keys.len());
        }
        let cache = self.clone();
        transaction::on_transaction_end(move || cache.evict_now(&keys));
    }

    /// Evict every cached shape that could contain the edge `key`.
    pub fn evict_relation(&self, key: &RelationKey) {
        self.evict(RelationCacheKey::eviction_keys(key).to_vec());
    }

    fn evict_now(&self, keys: &[RelationCacheKey]) {
        let mut entries = self.entries.lock().unwrap();
        for key in keys {
            entries.invalidate(key);
        }
        self.counters
            .evictions
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        log::trace!("Evicted {} cache keys", keys.len());
    }

    pub fn contains(&self, key: &RelationCacheKey) -> bool {
        self.entries.lock().unwrap().lru.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().lru.is_empty()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.lru.clear();
        for load in entries.in_flight.values_mut() {
            load.evictions += 1;
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Transaction;
    use crate::entity::{EntityRef, EntityType};
    use crate::graph::{RelationTypeGroup, CONTAINS_TYPE};
    use std::sync::atomic::AtomicUsize;

    fn edge() -> Relation {
        Relation::new(
            EntityRef::random(EntityType::Asset),
            EntityRef::random(EntityType::Device),
            CONTAINS_TYPE,
        )
    }

    fn outgoing_key(rel: &Relation) -> RelationCacheKey {
        RelationCacheKey::outgoing(rel.from, None, RelationTypeGroup::Common)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute(outgoing_key(&rel), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![rel.clone()])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![rel.clone()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, evictions: 0 });
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let err = cache
            .get_or_compute(outgoing_key(&rel), || async {
                Err(crate::RelgraphError::Storage("down".to_string()))
            })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_evict_relation_drops_all_shapes() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let key = rel.key();
        for shape in RelationCacheKey::eviction_keys(&key) {
            let value = vec![rel.clone()];
            cache.get_or_compute(shape, || async { Ok(value) }).await.unwrap();
        }
        assert_eq!(cache.len(), 5);
        cache.evict_relation(&key);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 5);
    }

    #[tokio::test]
    async fn test_read_inside_transaction_bypasses_cache() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let stale = vec![rel.clone()];
        cache.get_or_compute(outgoing_key(&rel), || async { Ok(stale) }).await.unwrap();

        let tx = Transaction::begin();
        let fresh = tx
            .scope(cache.get_or_compute(outgoing_key(&rel), || async { Ok(Vec::new()) }))
            .await
            .unwrap();
        assert!(fresh.is_empty());
        // The bypassed read neither consulted nor replaced the entry.
        assert_eq!(cache.stats().hits, 0);
        assert!(cache.contains(&outgoing_key(&rel)));
        tx.commit();
    }

    #[tokio::test]
    async fn test_eviction_deferred_until_commit() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let value = vec![rel.clone()];
        cache.get_or_compute(outgoing_key(&rel), || async { Ok(value) }).await.unwrap();

        let tx = Transaction::begin();
        tx.scope(async { cache.evict_relation(&rel.key()) }).await;
        assert!(cache.contains(&outgoing_key(&rel)));

        tx.commit();
        assert!(!cache.contains(&outgoing_key(&rel)));
    }

    #[tokio::test]
    async fn test_eviction_runs_on_rollback() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let value = vec![rel.clone()];
        cache.get_or_compute(outgoing_key(&rel), || async { Ok(value) }).await.unwrap();

        let tx = Transaction::begin();
        tx.scope(async { cache.evict_relation(&rel.key()) }).await;
        assert!(cache.contains(&outgoing_key(&rel)));

        assert_eq!(tx.rollback(), 1);
        assert!(!cache.contains(&outgoing_key(&rel)));
    }

    #[tokio::test]
    async fn test_concurrent_eviction_blocks_population() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let key = rel.key();
        let value = cache
            .get_or_compute(outgoing_key(&rel), || async {
                // A writer invalidates while this load is in flight.
                cache.evict_relation(&key);
                Ok(vec![rel.clone()])
            })
            .await
            .unwrap();
        assert_eq!(value.len(), 1);
        assert!(!cache.contains(&outgoing_key(&rel)));
    }

    #[tokio::test]
    async fn test_unrelated_eviction_does_not_block_population() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let other = edge();
        cache
            .get_or_compute(outgoing_key(&rel), || async {
                cache.evict_relation(&other.key());
                Ok(vec![rel.clone()])
            })
            .await
            .unwrap();
        assert!(cache.contains(&outgoing_key(&rel)));
        assert!(cache.entries.lock().unwrap().in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_load_deregisters() {
        let cache = RelationCache::new(10);
        let rel = edge();
        let pending = cache.get_or_compute(outgoing_key(&rel), || std::future::pending());
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert!(cache.entries.lock().unwrap().in_flight.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache = RelationCache::disabled();
        let rel = edge();
        let value = vec![rel.clone()];
        cache.get_or_compute(outgoing_key(&rel), || async { Ok(value) }).await.unwrap();
        assert!(cache.is_empty());
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn test_lru_capacity_bound() {
        let cache = RelationCache::new(2);
        let rels: Vec<_> = (0..3).map(|_| edge()).collect();
        for rel in &rels {
            let value = vec![rel.clone()];
            cache.get_or_compute(outgoing_key(rel), || async { Ok(value) }).await.unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&outgoing_key(&rels[0])));
    }
}
