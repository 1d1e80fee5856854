//! Deterministic synthetic-data coordinator: implements the same
//! `CatalogApi` surface as the real coordinator, so a UI under development
//! (or a demo/benchmark run) can drive the catalog without a real photo
//! library or decoder. Synthetic folders and assets come from a seeded
//! `ChaCha8Rng`, reproducible by seeding from an explicit index rather than
//! `thread_rng`, so repeated demo runs produce identical data.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use time::OffsetDateTime;
use tokio::time::Duration;

use crate::cache::{CacheConfig, DerivativeCache};
use crate::collab::Decoder;
use crate::coordinator::{
    self, CatalogApi, CoordinatorState, OnAssetsAdded, OnAssetUpdated, OnScanProgress, OnStateChanged,
};
use crate::error::{CatalogError, Result};
use crate::model::{
    Asset, AssetFlag, AssetId, DerivativeKind, EditStateRecord, FlagCounts, FolderKey, FolderRecord, FolderSummary,
};
use crate::pipeline::DerivativePipeline;
use crate::priority::Priority;

const SAMPLE_EXTENSIONS: &[&str] = &["jpg", "arw"];

/// A decoder that fabricates plausible-looking derivative bytes after a
/// short synthetic delay, so the mock coordinator exercises the same
/// `pending -> loading -> ready` timing the real pipeline shows.
struct SyntheticDecoder;

#[async_trait::async_trait]
impl Decoder for SyntheticDecoder {
    async fn render_thumbnail(&self, source: Bytes, _target_size: u32) -> Result<Bytes> {
        tokio::time::sleep(Duration::from_millis(15)).await;
        Ok(source)
    }

    async fn render_edited_thumbnail(&self, source: Bytes, _edit_payload: Bytes, _target_size: u32) -> Result<Bytes> {
        tokio::time::sleep(Duration::from_millis(15)).await;
        Ok(source)
    }

    async fn render_preview(&self, source: Bytes, _edit_payload: Option<Bytes>, _target_size: u32) -> Result<Bytes> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(source)
    }
}

/// Seeded synthetic-library coordinator.
pub struct MockCoordinator {
    thumbnail_cache: Arc<DerivativeCache>,
    preview_cache: Arc<DerivativeCache>,
    thumbnail_pipeline: Arc<DerivativePipeline<SyntheticDecoder>>,
    preview_pipeline: Arc<DerivativePipeline<SyntheticDecoder>>,
    assets: RwLock<HashMap<AssetId, Asset>>,
    folders: RwLock<Vec<FolderRecord>>,
    edit_states: RwLock<HashMap<AssetId, EditStateRecord>>,
    state: RwLock<CoordinatorState>,
    on_assets_added: RwLock<Option<OnAssetsAdded>>,
    on_asset_updated: RwLock<Option<OnAssetUpdated>>,
    on_scan_progress: RwLock<Option<OnScanProgress>>,
    on_state_changed: RwLock<Option<OnStateChanged>>,
}

impl MockCoordinator {
    /// Builds a mock coordinator with a synthetic library generated from
    /// `seed_index`. The same index always produces the same folders,
    /// assets, and ordering — demo runs are reproducible across processes.
    pub fn new(cache_root: impl Into<std::path::PathBuf>, seed_index: u64, asset_count: usize) -> Result<Self> {
        let cache_root = cache_root.into();
        let thumbnail_cache = Arc::new(DerivativeCache::open(CacheConfig {
            memory_shards: 2,
            memory_capacity: 150,
            persistent_root: cache_root.join("thumbnails"),
        })?);
        let preview_cache = Arc::new(DerivativeCache::open(CacheConfig {
            memory_shards: 2,
            memory_capacity: 50,
            persistent_root: cache_root.join("previews"),
        })?);
        let decoder = Arc::new(SyntheticDecoder);
        let thumbnail_pipeline = Arc::new(DerivativePipeline::new(
            DerivativeKind::Thumbnail,
            decoder.clone(),
            thumbnail_cache.clone(),
            4,
            512,
        ));
        let preview_pipeline = Arc::new(DerivativePipeline::new(
            DerivativeKind::Preview,
            decoder,
            preview_cache.clone(),
            2,
            2560,
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(seed_index);
        let folder = FolderRecord {
            key: FolderKey(1),
            path: format!("/synthetic/library-{seed_index}"),
            name: format!("Synthetic Library {seed_index}"),
            handle_lookup_key: format!("synthetic-{seed_index}"),
            last_scan_instant: Some(OffsetDateTime::now_utc()),
        };
        let mut assets = HashMap::new();
        for i in 0..asset_count {
            let ext = SAMPLE_EXTENSIONS[rng.gen_range(0..SAMPLE_EXTENSIONS.len())];
            let width = rng.gen_range(3000..9000);
            let height = rng.gen_range(2000..6000);
            let byte_size = rng.gen_range(2_000_000..40_000_000);
            let mut asset = Asset::new_ingested(
                folder.key,
                format!("synthetic_{i:05}.{ext}"),
                format!("synthetic_{i:05}.{ext}"),
                ext.to_string(),
                byte_size,
                OffsetDateTime::now_utc(),
            );
            asset.dimensions = Some((width, height));
            assets.insert(asset.id.clone(), asset);
        }

        Ok(Self {
            thumbnail_cache,
            preview_cache,
            thumbnail_pipeline,
            preview_pipeline,
            assets: RwLock::new(assets),
            folders: RwLock::new(vec![folder]),
            edit_states: RwLock::new(HashMap::new()),
            state: RwLock::new(CoordinatorState::Ready),
            on_assets_added: RwLock::new(None),
            on_asset_updated: RwLock::new(None),
            on_scan_progress: RwLock::new(None),
            on_state_changed: RwLock::new(None),
        })
    }

    /// Wires pipeline callbacks; call once after wrapping in `Arc`, same
    /// two-phase construction as the real coordinator.
    pub fn attach(self: &Arc<Self>) {
        for kind in [DerivativeKind::Thumbnail, DerivativeKind::Preview] {
            let coordinator = Arc::downgrade(self);
            let pipeline = self.pipeline_for(kind);
            pipeline.set_on_ready(Some(Arc::new(move |id, handle| {
                if let Some(coordinator) = coordinator.upgrade() {
                    coordinator.apply_ready(&id, kind, handle);
                }
            })));
        }
    }

    fn pipeline_for(&self, kind: DerivativeKind) -> &Arc<DerivativePipeline<SyntheticDecoder>> {
        match kind {
            DerivativeKind::Thumbnail => &self.thumbnail_pipeline,
            DerivativeKind::Preview => &self.preview_pipeline,
        }
    }

    fn cache_for(&self, kind: DerivativeKind) -> &Arc<DerivativeCache> {
        match kind {
            DerivativeKind::Thumbnail => &self.thumbnail_cache,
            DerivativeKind::Preview => &self.preview_cache,
        }
    }

    fn apply_ready(&self, id: &AssetId, kind: DerivativeKind, handle: crate::model::DerivativeHandle) {
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.set_derivative(kind, crate::model::DerivativeState::Ready(handle));
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            if let Some(callback) = self.on_asset_updated.read().as_ref() {
                callback(asset);
            }
        }
    }

    fn synthetic_bytes(&self, id: &AssetId) -> crate::collab::BytesProducer {
        let seed = id.as_str().to_string();
        Arc::new(move || {
            let seed = seed.clone();
            Box::pin(async move { Ok(seed.into_bytes()) })
        })
    }

    fn request_derivative(&self, id: &AssetId, kind: DerivativeKind, priority: Priority) {
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.set_derivative(kind, crate::model::DerivativeState::Loading);
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            if let Some(callback) = self.on_asset_updated.read().as_ref() {
                callback(asset);
            }
        }
        self.pipeline_for(kind).request(id.clone(), self.synthetic_bytes(id), priority);
    }
}

#[async_trait::async_trait]
impl CatalogApi for MockCoordinator {
    async fn choose_folder(&self) -> Result<()> {
        Ok(())
    }

    async fn open_recent_folder(&self, key: FolderKey) -> Result<()> {
        if self.folders.read().iter().any(|f| f.key == key) {
            Ok(())
        } else {
            Err(CatalogError::FolderNotFound(format!("{key:?}")))
        }
    }

    async fn load_from_persistence(&self) -> Result<bool> {
        Ok(!self.folders.read().is_empty())
    }

    fn list_recent_folders(&self) -> Result<Vec<FolderSummary>> {
        Ok(self
            .folders
            .read()
            .iter()
            .map(|f| FolderSummary {
                key: f.key,
                name: f.name.clone(),
                path: f.path.clone(),
                last_scan_instant: f.last_scan_instant,
                is_accessible: true,
            })
            .collect())
    }

    async fn rescan(&self) -> Result<()> {
        Ok(())
    }

    fn cancel_scan(&self) {}

    fn current_state(&self) -> CoordinatorState {
        self.state.read().clone()
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.read().values().cloned().collect()
    }

    fn set_flag(&self, id: &AssetId, flag: AssetFlag) -> Result<()> {
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.flag = flag;
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            if let Some(callback) = self.on_asset_updated.read().as_ref() {
                callback(asset);
            }
            Ok(())
        } else {
            Err(CatalogError::Unknown(format!("unknown asset {id}")))
        }
    }

    fn set_flag_batch(&self, ids: &[AssetId], flag: AssetFlag) -> Result<()> {
        let mut changed = Vec::new();
        {
            let mut assets = self.assets.write();
            for id in ids {
                if let Some(asset) = assets.get_mut(id) {
                    if asset.flag != flag {
                        asset.flag = flag;
                        changed.push(asset.clone());
                    }
                }
            }
        }
        for asset in changed {
            if let Some(callback) = self.on_asset_updated.read().as_ref() {
                callback(asset);
            }
        }
        Ok(())
    }

    fn counts_by_flag(&self) -> FlagCounts {
        coordinator::counts_by_flag(self.assets.read().values())
    }

    fn save_edit_state(&self, id: &AssetId, payload: Vec<u8>) -> Result<()> {
        self.edit_states.write().insert(
            id.clone(),
            EditStateRecord {
                asset_id: id.clone(),
                schema_version: 1,
                updated_instant: OffsetDateTime::now_utc(),
                payload,
            },
        );
        Ok(())
    }

    fn load_edit_state(&self, id: &AssetId) -> Result<Option<EditStateRecord>> {
        Ok(self.edit_states.read().get(id).cloned())
    }

    fn request_thumbnail(&self, id: &AssetId, priority: Priority) {
        self.request_derivative(id, DerivativeKind::Thumbnail, priority);
    }

    fn request_preview(&self, id: &AssetId, priority: Priority) {
        self.request_derivative(id, DerivativeKind::Preview, priority);
    }

    fn update_priority(&self, id: &AssetId, kind: DerivativeKind, priority: Priority) {
        self.pipeline_for(kind).update_priority(id, priority);
    }

    fn cancel_derivative(&self, id: &AssetId, kind: DerivativeKind) {
        self.pipeline_for(kind).cancel(id);
    }

    fn cancel_all(&self, kind: DerivativeKind) {
        self.pipeline_for(kind).cancel_all();
    }

    fn cancel_background(&self, kind: DerivativeKind) -> usize {
        self.pipeline_for(kind).cancel_background()
    }

    fn invalidate(&self, id: &AssetId, kind: DerivativeKind) {
        self.pipeline_for(kind).invalidate(id);
        self.cache_for(kind).invalidate(id, kind);
    }

    fn regenerate(&self, id: &AssetId, kind: DerivativeKind, edit_payload: Bytes, priority: Priority) -> Result<()> {
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.set_derivative(kind, crate::model::DerivativeState::Loading);
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            if let Some(callback) = self.on_asset_updated.read().as_ref() {
                callback(asset);
            }
        }
        self.pipeline_for(kind).regenerate(id.clone(), self.synthetic_bytes(id), edit_payload, priority);
        Ok(())
    }

    fn on_assets_added(&self, callback: Option<OnAssetsAdded>) {
        *self.on_assets_added.write() = callback;
    }

    fn on_asset_updated(&self, callback: Option<OnAssetUpdated>) {
        *self.on_asset_updated.write() = callback;
    }

    fn on_scan_progress(&self, callback: Option<OnScanProgress>) {
        *self.on_scan_progress.write() = callback;
    }

    fn on_state_changed(&self, callback: Option<OnStateChanged>) {
        *self.on_state_changed.write() = callback;
    }

    fn destroy(&self) {
        self.thumbnail_pipeline.cancel_all();
        self.preview_pipeline.cancel_all();
        self.thumbnail_cache.clear_memory();
        self.preview_cache.clear_memory();
        self.assets.write().clear();
        self.edit_states.write().clear();
        *self.state.write() = CoordinatorState::Initializing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_produces_same_library() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = MockCoordinator::new(dir_a.path(), 42, 10).unwrap();
        let b = MockCoordinator::new(dir_b.path(), 42, 10).unwrap();

        let mut names_a: Vec<_> = a.assets().into_iter().map(|asset| asset.filename).collect();
        let mut names_b: Vec<_> = b.assets().into_iter().map(|asset| asset.filename).collect();
        names_a.sort();
        names_b.sort();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn different_seeds_produce_different_libraries() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = MockCoordinator::new(dir_a.path(), 1, 10).unwrap();
        let b = MockCoordinator::new(dir_b.path(), 2, 10).unwrap();
        assert_ne!(a.list_recent_folders().unwrap(), b.list_recent_folders().unwrap());
    }

    #[test]
    fn set_flag_batch_and_counts_by_flag_agree_with_the_real_coordinator() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = MockCoordinator::new(dir.path(), 3, 5).unwrap();
        let ids: Vec<AssetId> = coordinator.assets().into_iter().map(|a| a.id).collect();
        coordinator.set_flag_batch(&ids[..2], AssetFlag::Reject).unwrap();
        let counts = coordinator.counts_by_flag();
        assert_eq!(counts.all, 5);
        assert_eq!(counts.rejects, 2);
        assert_eq!(counts.unflagged, 3);
    }

    #[test]
    fn edit_state_round_trips_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = MockCoordinator::new(dir.path(), 9, 1).unwrap();
        let id = coordinator.assets()[0].id.clone();
        assert!(coordinator.load_edit_state(&id).unwrap().is_none());
        coordinator.save_edit_state(&id, vec![1, 2, 3]).unwrap();
        assert_eq!(coordinator.load_edit_state(&id).unwrap().unwrap().payload, vec![1, 2, 3]);
    }

    #[test]
    fn destroy_clears_assets_and_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = MockCoordinator::new(dir.path(), 11, 4).unwrap();
        coordinator.destroy();
        assert!(coordinator.assets().is_empty());
        assert_eq!(coordinator.current_state(), CoordinatorState::Initializing);
    }

    #[tokio::test]
    async fn requesting_thumbnail_eventually_becomes_ready() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Arc::new(MockCoordinator::new(dir.path(), 7, 1).unwrap());
        coordinator.attach();
        let id = coordinator.assets()[0].id.clone();
        coordinator.request_thumbnail(&id, Priority::Visible);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let asset = coordinator.assets().into_iter().find(|a| a.id == id).unwrap();
        assert!(matches!(asset.thumbnail, crate::model::DerivativeState::Ready(_)));
    }
}
