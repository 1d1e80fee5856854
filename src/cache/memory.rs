//! In-process memory tier: a sharded, bounded LRU of decoded derivative
//! bytes. Sharding follows the same pattern as the version cache that backs
//! page lookups in the storage engine — a fixed number of independently
//! locked `LruCache` shards, keyed by hashing into a shard index, so hot
//! concurrent access to different assets doesn't serialize on one lock.

use std::num::NonZeroUsize;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::model::{AssetId, DerivativeKind};

/// Composite key: an asset's derivative is cached independently per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey(AssetId, DerivativeKind);

/// Sharded bounded LRU of derivative bytes.
pub struct MemoryCache {
    shards: Vec<Mutex<lru::LruCache<CacheKey, Bytes>>>,
}

impl MemoryCache {
    /// Builds a cache with the given shard count and total entry capacity
    /// (split evenly, at least one slot per shard).
    pub fn new(shard_count: usize, capacity: usize) -> Self {
        let shard_count = shard_count.max(1);
        let per_shard = (capacity / shard_count).max(1);
        let cap = NonZeroUsize::new(per_shard).unwrap();
        let shards = (0..shard_count)
            .map(|_| Mutex::new(lru::LruCache::new(cap)))
            .collect();
        Self { shards }
    }

    /// Looks up cached bytes for an asset's derivative, promoting it to
    /// most-recently-used on hit.
    pub fn get(&self, id: &AssetId, kind: DerivativeKind) -> Option<Bytes> {
        let key = CacheKey(id.clone(), kind);
        self.shard_for(&key).lock().get(&key).cloned()
    }

    /// Inserts or replaces cached bytes for an asset's derivative.
    pub fn insert(&self, id: &AssetId, kind: DerivativeKind, bytes: Bytes) {
        let key = CacheKey(id.clone(), kind);
        self.shard_for(&key).lock().put(key, bytes);
    }

    /// True if an asset's derivative is currently cached in memory, without
    /// disturbing LRU order.
    pub fn has(&self, id: &AssetId, kind: DerivativeKind) -> bool {
        let key = CacheKey(id.clone(), kind);
        self.shard_for(&key).lock().contains(&key)
    }

    /// Evicts a single asset's derivative, if present.
    pub fn invalidate(&self, id: &AssetId, kind: DerivativeKind) {
        let key = CacheKey(id.clone(), kind);
        self.shard_for(&key).lock().pop(&key);
    }

    /// Evicts both derivative kinds for an asset (used on regenerate/delete).
    pub fn invalidate_asset(&self, id: &AssetId) {
        self.invalidate(id, DerivativeKind::Thumbnail);
        self.invalidate(id, DerivativeKind::Preview);
    }

    /// Drops every entry across all shards.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    fn shard_for(&self, key: &CacheKey) -> &Mutex<lru::LruCache<CacheKey, Bytes>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aid(n: u32) -> AssetId {
        AssetId(format!("a{n}"))
    }

    #[test]
    fn insert_then_get_hits() {
        let cache = MemoryCache::new(4, 16);
        cache.insert(&aid(1), DerivativeKind::Thumbnail, Bytes::from_static(b"abc"));
        assert_eq!(
            cache.get(&aid(1), DerivativeKind::Thumbnail),
            Some(Bytes::from_static(b"abc"))
        );
    }

    #[test]
    fn kinds_are_independent() {
        let cache = MemoryCache::new(4, 16);
        cache.insert(&aid(1), DerivativeKind::Thumbnail, Bytes::from_static(b"thumb"));
        assert_eq!(cache.get(&aid(1), DerivativeKind::Preview), None);
    }

    #[test]
    fn invalidate_removes_one_kind_only() {
        let cache = MemoryCache::new(4, 16);
        cache.insert(&aid(1), DerivativeKind::Thumbnail, Bytes::from_static(b"t"));
        cache.insert(&aid(1), DerivativeKind::Preview, Bytes::from_static(b"p"));
        cache.invalidate(&aid(1), DerivativeKind::Thumbnail);
        assert_eq!(cache.get(&aid(1), DerivativeKind::Thumbnail), None);
        assert!(cache.get(&aid(1), DerivativeKind::Preview).is_some());
    }

    #[test]
    fn eviction_under_pressure_drops_lru_entry() {
        let cache = MemoryCache::new(1, 2);
        cache.insert(&aid(1), DerivativeKind::Thumbnail, Bytes::from_static(b"1"));
        cache.insert(&aid(2), DerivativeKind::Thumbnail, Bytes::from_static(b"2"));
        cache.insert(&aid(3), DerivativeKind::Thumbnail, Bytes::from_static(b"3"));
        assert_eq!(cache.get(&aid(1), DerivativeKind::Thumbnail), None);
        assert!(cache.get(&aid(3), DerivativeKind::Thumbnail).is_some());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = MemoryCache::new(2, 8);
        cache.insert(&aid(1), DerivativeKind::Thumbnail, Bytes::from_static(b"x"));
        cache.clear();
        assert_eq!(cache.get(&aid(1), DerivativeKind::Thumbnail), None);
    }
}
