//! Two-tier derivative cache: a bounded in-memory LRU backed by a
//! persistent on-disk tier. Reads check memory first, then disk (promoting
//! disk hits back into memory); writes land in both tiers, with a
//! persistent-tier failure logged and degraded rather than propagated —
//! losing the disk copy never loses correctness, only a future cold start.

mod memory;
mod persistent;

pub use memory::MemoryCache;
pub use persistent::PersistentCache;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::error::Result;
use crate::model::{AssetId, DerivativeKind};

/// Cache capacity configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Number of memory-tier LRU shards.
    pub memory_shards: usize,
    /// Total memory-tier entry capacity, split across shards.
    pub memory_capacity: usize,
    /// Directory the persistent tier is rooted at.
    pub persistent_root: PathBuf,
}

/// Two-tier derivative cache.
pub struct DerivativeCache {
    memory: MemoryCache,
    persistent: Arc<PersistentCache>,
}

impl DerivativeCache {
    /// Opens a cache with the memory tier sized per `config` and the
    /// persistent tier rooted at `config.persistent_root`.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Ok(Self {
            memory: MemoryCache::new(config.memory_shards, config.memory_capacity),
            persistent: Arc::new(PersistentCache::open(config.persistent_root)?),
        })
    }

    /// Looks up a derivative, checking memory then disk. A disk hit is
    /// promoted into memory before being returned.
    pub fn get(&self, id: &AssetId, kind: DerivativeKind) -> Option<Bytes> {
        if let Some(hit) = self.memory.get(id, kind) {
            return Some(hit);
        }
        let hit = self.persistent.get(id, kind)?;
        self.memory.insert(id, kind, hit.clone());
        Some(hit)
    }

    /// Stores a freshly-generated derivative in both tiers. The memory tier
    /// is updated synchronously; the persistent-tier write is dispatched
    /// onto a blocking task and never awaited here — a disk failure (disk
    /// full, permissions) is logged from that task and never propagated to
    /// the caller, since losing the disk copy only costs a future cold
    /// start, not correctness.
    pub fn put(&self, id: &AssetId, kind: DerivativeKind, bytes: Bytes) {
        self.memory.insert(id, kind, bytes.clone());
        let persistent = self.persistent.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = persistent.put(&id, kind, &bytes) {
                warn!(%id, kind = kind.label(), %err, "persistent cache write failed, continuing memory-only");
            }
        });
    }

    /// True if either tier currently holds this derivative.
    pub fn has(&self, id: &AssetId, kind: DerivativeKind) -> bool {
        self.memory.has(id, kind) || self.persistent.has(id, kind)
    }

    /// Evicts one derivative kind from both tiers.
    pub fn invalidate(&self, id: &AssetId, kind: DerivativeKind) {
        self.memory.invalidate(id, kind);
        self.persistent.invalidate(id, kind);
    }

    /// Evicts both derivative kinds for an asset from both tiers. Used on
    /// regenerate (edit-state change) and on asset removal.
    pub fn invalidate_asset(&self, id: &AssetId) {
        self.memory.invalidate_asset(id);
        self.persistent.invalidate_asset(id);
    }

    /// Drops the memory tier only, e.g. under a UI-issued cache-pressure hint.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    /// Drops both tiers entirely: memory immediately, persistent files
    /// best-effort (failures are logged, not surfaced — this is a bulk
    /// convenience, not a durability guarantee).
    pub fn clear_all(&self) {
        self.memory.clear();
        for kind in [DerivativeKind::Thumbnail, DerivativeKind::Preview] {
            if let Err(err) = std::fs::remove_dir_all(self.persistent.root().join(kind.label())) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(kind = kind.label(), %err, "failed to clear persistent cache directory");
                }
            }
            let _ = std::fs::create_dir_all(self.persistent.root().join(kind.label()));
        }
    }
}
