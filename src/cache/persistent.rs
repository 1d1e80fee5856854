//! On-disk derivative tier: content-addressed files under a cache root,
//! written via temp-file-then-rename so a crash mid-write never leaves a
//! reader with a truncated file, with a trailing CRC32 to catch the rare
//! case of silent disk corruption on read.
//!
//! This tier is a pure cache, not a record of truth: any failure to read or
//! write it degrades to "treat as a miss" rather than surfacing to the
//! caller, per the storage-full/corruption handling policy.

use std::path::{Path, PathBuf};

use base64::Engine;
use bytes::Bytes;
use tracing::warn;

use crate::error::Result;
use crate::model::{AssetId, DerivativeKind};

/// File-backed second tier of the derivative cache.
pub struct PersistentCache {
    root: PathBuf,
}

impl PersistentCache {
    /// Opens (creating if absent) a persistent cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        for kind in [DerivativeKind::Thumbnail, DerivativeKind::Preview] {
            std::fs::create_dir_all(root.join(kind.label()))?;
        }
        Ok(Self { root })
    }

    /// Reads cached bytes for an asset's derivative, verifying the trailing
    /// checksum. A corrupt or unreadable entry is treated as a cache miss
    /// and removed so it doesn't keep failing on every lookup.
    pub fn get(&self, id: &AssetId, kind: DerivativeKind) -> Option<Bytes> {
        let path = self.path_for(id, kind);
        let raw = std::fs::read(&path).ok()?;
        match verify_and_strip_checksum(&raw) {
            Some(payload) => Some(Bytes::from(payload)),
            None => {
                warn!(path = %path.display(), "persistent cache entry failed checksum, evicting");
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Writes bytes for an asset's derivative durably: the payload is
    /// written with an appended checksum to a sibling temp file, then
    /// renamed into place, so concurrent readers never see a partial file.
    ///
    /// Failures here (disk full, permissions) are swallowed by the caller's
    /// policy of degrading to memory-only; this method surfaces them so the
    /// cache layer can decide, but never panics.
    pub fn put(&self, id: &AssetId, kind: DerivativeKind, bytes: &Bytes) -> Result<()> {
        let path = self.path_for(id, kind);
        let dir = path.parent().expect("derivative path has a parent");
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            use std::io::Write;
            tmp.write_all(bytes)?;
            tmp.write_all(&checksum(bytes).to_le_bytes())?;
            tmp.flush()?;
        }
        tmp.persist(&path)
            .map_err(|e| crate::error::CatalogError::StorageFull(e.to_string()))?;
        Ok(())
    }

    /// True if a derivative file exists for this asset, without validating
    /// its checksum.
    pub fn has(&self, id: &AssetId, kind: DerivativeKind) -> bool {
        self.path_for(id, kind).exists()
    }

    /// Removes a cached derivative file, if present.
    pub fn invalidate(&self, id: &AssetId, kind: DerivativeKind) {
        let _ = std::fs::remove_file(self.path_for(id, kind));
    }

    /// Removes both derivative files for an asset.
    pub fn invalidate_asset(&self, id: &AssetId) {
        self.invalidate(id, DerivativeKind::Thumbnail);
        self.invalidate(id, DerivativeKind::Preview);
    }

    fn path_for(&self, id: &AssetId, kind: DerivativeKind) -> PathBuf {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(id.as_str());
        self.root.join(kind.label()).join(format!("{encoded}.bin"))
    }

    /// Root directory this cache was opened against.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

fn verify_and_strip_checksum(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.len() < 4 {
        return None;
    }
    let (payload, tail) = raw.split_at(raw.len() - 4);
    let want = u32::from_le_bytes(tail.try_into().ok()?);
    if checksum(payload) != want {
        return None;
    }
    Some(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aid(n: u32) -> AssetId {
        AssetId(format!("a{n}"))
    }

    #[test]
    fn round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::open(dir.path()).unwrap();
        let bytes = Bytes::from_static(b"hello derivative");
        cache.put(&aid(1), DerivativeKind::Thumbnail, &bytes).unwrap();
        assert_eq!(cache.get(&aid(1), DerivativeKind::Thumbnail), Some(bytes));
    }

    #[test]
    fn missing_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::open(dir.path()).unwrap();
        assert_eq!(cache.get(&aid(1), DerivativeKind::Thumbnail), None);
    }

    #[test]
    fn corrupted_entry_is_treated_as_miss_and_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::open(dir.path()).unwrap();
        let bytes = Bytes::from_static(b"hello derivative");
        cache.put(&aid(1), DerivativeKind::Thumbnail, &bytes).unwrap();
        let path = cache.path_for(&aid(1), DerivativeKind::Thumbnail);
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();

        assert_eq!(cache.get(&aid(1), DerivativeKind::Thumbnail), None);
        assert!(!path.exists());
    }

    #[test]
    fn invalidate_asset_clears_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCache::open(dir.path()).unwrap();
        let bytes = Bytes::from_static(b"x");
        cache.put(&aid(1), DerivativeKind::Thumbnail, &bytes).unwrap();
        cache.put(&aid(1), DerivativeKind::Preview, &bytes).unwrap();
        cache.invalidate_asset(&aid(1));
        assert_eq!(cache.get(&aid(1), DerivativeKind::Thumbnail), None);
        assert_eq!(cache.get(&aid(1), DerivativeKind::Preview), None);
    }
}
