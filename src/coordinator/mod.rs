//! The catalog coordinator: the single object the UI talks to. It owns the
//! in-memory asset projection, the current folder, the two derivative
//! pipelines, the two-tier caches, and the persistence layer, and exposes
//! one `async`/sync operation surface (`CatalogApi`) that both it and
//! `mock::MockCoordinator` implement.

mod state;

pub use state::CoordinatorState;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::cache::{CacheConfig, DerivativeCache};
use crate::collab::{BytesProducer, Decoder, DirectoryHandle, FolderPicker, PathHandle};
use crate::config::Config;
use crate::db::{CatalogStore, HandleStore};
use crate::error::{CatalogError, Result};
use crate::model::{
    Asset, AssetFlag, AssetId, DerivativeKind, EditStateRecord, FlagCounts, FolderKey, FolderRecord,
    FolderSummary,
};
use crate::pipeline::DerivativePipeline;
use crate::priority::Priority;
use crate::scan::{self, CancellationToken};

/// Fired with every batch of newly-ingested or newly-updated assets.
pub type OnAssetsAdded = Arc<dyn Fn(Vec<Asset>) + Send + Sync>;
/// Fired whenever a single asset's projection changes (flag, derivative state).
pub type OnAssetUpdated = Arc<dyn Fn(Asset) + Send + Sync>;
/// Fired with the running count of entries ingested during a scan.
pub type OnScanProgress = Arc<dyn Fn(usize) + Send + Sync>;
/// Fired whenever the coordinator's own lifecycle state changes.
pub type OnStateChanged = Arc<dyn Fn(CoordinatorState) + Send + Sync>;

/// Tallies flags over an asset iterator. Shared by the real coordinator and
/// `mock::MockCoordinator` so `counts_by_flag` agrees between the two.
pub fn counts_by_flag<'a>(assets: impl Iterator<Item = &'a Asset>) -> FlagCounts {
    let mut counts = FlagCounts::default();
    for asset in assets {
        counts.all += 1;
        match asset.flag {
            AssetFlag::None => counts.unflagged += 1,
            AssetFlag::Pick => counts.picks += 1,
            AssetFlag::Reject => counts.rejects += 1,
        }
    }
    counts
}

/// The public operation surface the UI drives, shared by the real
/// coordinator and the deterministic mock/demo coordinator so a caller can
/// depend on one trait object regardless of which backs it.
#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    /// Prompts the user to choose a folder and opens it as current.
    async fn choose_folder(&self) -> Result<()>;

    /// Opens a previously-catalogued folder by its store key.
    async fn open_recent_folder(&self, key: FolderKey) -> Result<()>;

    /// Session restore: reopens the most recently catalogued folder without
    /// prompting for permission. Returns `false` (leaving the in-memory map
    /// empty and state `ready`) if there is no catalogued folder, its handle
    /// is missing, or its permission is not already granted.
    async fn load_from_persistence(&self) -> Result<bool>;

    /// Lists catalogued folders with a non-interactive accessibility probe.
    fn list_recent_folders(&self) -> Result<Vec<FolderSummary>>;

    /// Re-scans the current folder, ingesting new files and updating
    /// changed ones.
    async fn rescan(&self) -> Result<()>;

    /// Cancels an in-flight scan, if any. No-op otherwise.
    fn cancel_scan(&self);

    /// Current lifecycle state.
    fn current_state(&self) -> CoordinatorState;

    /// Snapshot of every asset in the current folder.
    fn assets(&self) -> Vec<Asset>;

    /// Sets a user annotation on an asset.
    fn set_flag(&self, id: &AssetId, flag: AssetFlag) -> Result<()>;

    /// Sets a user annotation on a batch of assets in one transaction,
    /// firing `on_asset_updated` once per asset whose flag actually changed.
    fn set_flag_batch(&self, ids: &[AssetId], flag: AssetFlag) -> Result<()>;

    /// Flag tallies over the in-memory asset map.
    fn counts_by_flag(&self) -> FlagCounts;

    /// Stores an opaque edit-state payload for an asset, upserting any
    /// existing record. The payload is round-tripped verbatim; the catalog
    /// never interprets it.
    fn save_edit_state(&self, id: &AssetId, payload: Vec<u8>) -> Result<()>;

    /// Reads the stored edit-state record for an asset, if any.
    fn load_edit_state(&self, id: &AssetId) -> Result<Option<EditStateRecord>>;

    /// Requests a thumbnail at the given priority.
    fn request_thumbnail(&self, id: &AssetId, priority: Priority);

    /// Requests a preview at the given priority.
    fn request_preview(&self, id: &AssetId, priority: Priority);

    /// Changes the queued priority of a pending derivative request.
    fn update_priority(&self, id: &AssetId, kind: DerivativeKind, priority: Priority);

    /// Cancels a single pending derivative request.
    fn cancel_derivative(&self, id: &AssetId, kind: DerivativeKind);

    /// Cancels every pending request for one derivative kind.
    fn cancel_all(&self, kind: DerivativeKind);

    /// Cancels every background-priority pending request for one kind.
    /// Returns the number of entries removed.
    fn cancel_background(&self, kind: DerivativeKind) -> usize;

    /// Invalidates a cached/in-flight derivative back to pending.
    fn invalidate(&self, id: &AssetId, kind: DerivativeKind);

    /// Invalidates then re-requests with an edit-state payload attached.
    fn regenerate(&self, id: &AssetId, kind: DerivativeKind, edit_payload: Bytes, priority: Priority) -> Result<()>;

    /// Installs (or clears) the assets-added callback.
    fn on_assets_added(&self, callback: Option<OnAssetsAdded>);

    /// Installs (or clears) the asset-updated callback.
    fn on_asset_updated(&self, callback: Option<OnAssetUpdated>);

    /// Installs (or clears) the scan-progress callback.
    fn on_scan_progress(&self, callback: Option<OnScanProgress>);

    /// Installs (or clears) the coordinator-state callback.
    fn on_state_changed(&self, callback: Option<OnStateChanged>);

    /// Tears the catalog down: cancels any active scan and all pipeline
    /// work, clears both caches' memory tiers, clears the in-memory asset
    /// map and current folder, and transitions to `initializing`. Idempotent.
    fn destroy(&self);
}

struct CurrentFolder {
    record: FolderRecord,
    handle: Arc<dyn DirectoryHandle>,
}

/// Real catalog coordinator, backed by persistent storage and a real
/// decoder.
pub struct Coordinator<D: Decoder + 'static> {
    config: Config,
    store: Arc<CatalogStore>,
    handles: Arc<HandleStore>,
    folder_picker: Arc<dyn FolderPicker>,
    thumbnail_cache: Arc<DerivativeCache>,
    preview_cache: Arc<DerivativeCache>,
    thumbnail_pipeline: Arc<DerivativePipeline<D>>,
    preview_pipeline: Arc<DerivativePipeline<D>>,
    assets: RwLock<HashMap<AssetId, Asset>>,
    current_folder: RwLock<Option<CurrentFolder>>,
    scan_token: RwLock<Option<CancellationToken>>,
    state: RwLock<CoordinatorState>,
    on_assets_added: RwLock<Option<OnAssetsAdded>>,
    on_asset_updated: RwLock<Option<OnAssetUpdated>>,
    on_scan_progress: RwLock<Option<OnScanProgress>>,
    on_state_changed: RwLock<Option<OnStateChanged>>,
}

impl<D: Decoder + 'static> Coordinator<D> {
    /// Builds a coordinator rooted at `cache_dir`/`db_path`, wiring both
    /// derivative pipelines to `decoder`.
    pub fn new(
        config: Config,
        db_path: impl Into<PathBuf>,
        handles_path: impl Into<PathBuf>,
        cache_root: impl Into<PathBuf>,
        decoder: Arc<D>,
        folder_picker: Arc<dyn FolderPicker>,
    ) -> Result<Self> {
        let cache_root = cache_root.into();
        let thumbnail_cache = Arc::new(DerivativeCache::open(CacheConfig {
            memory_shards: config.cache_memory_shards,
            memory_capacity: config.thumbnail_memory_capacity,
            persistent_root: cache_root.join("thumbnails"),
        })?);
        let preview_cache = Arc::new(DerivativeCache::open(CacheConfig {
            memory_shards: config.cache_memory_shards,
            memory_capacity: config.preview_memory_capacity,
            persistent_root: cache_root.join("previews"),
        })?);
        let thumbnail_pipeline = Arc::new(DerivativePipeline::new(
            DerivativeKind::Thumbnail,
            decoder.clone(),
            thumbnail_cache.clone(),
            config.thumbnail_concurrency,
            config.thumbnail_target_px,
        ));
        let preview_pipeline = Arc::new(DerivativePipeline::new(
            DerivativeKind::Preview,
            decoder,
            preview_cache.clone(),
            config.preview_concurrency,
            config.preview_target_px,
        ));

        let coordinator = Self {
            store: Arc::new(CatalogStore::open(db_path)?),
            handles: Arc::new(HandleStore::open(handles_path)?),
            folder_picker,
            thumbnail_cache,
            preview_cache,
            thumbnail_pipeline,
            preview_pipeline,
            assets: RwLock::new(HashMap::new()),
            current_folder: RwLock::new(None),
            scan_token: RwLock::new(None),
            state: RwLock::new(CoordinatorState::Initializing),
            on_assets_added: RwLock::new(None),
            on_asset_updated: RwLock::new(None),
            on_scan_progress: RwLock::new(None),
            on_state_changed: RwLock::new(None),
            config,
        };
        Ok(coordinator)
    }

    /// Opens a folder directly by path, bypassing `FolderPicker` — for
    /// callers (the admin/demo binary, tests) that already know the path
    /// rather than prompting the user to choose one.
    pub async fn open_folder_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let path_string = path.to_string_lossy().into_owned();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_string.clone());
        self.handles.put(&path_string, &path_string)?;
        let record = self.store.upsert_folder(&path_string, &name, &path_string)?;
        let handle: Arc<dyn DirectoryHandle> = Arc::new(PathHandle::new(path_string.clone()));
        self.ingest_folder(path_string, record, handle).await?;
        self.run_scan().await
    }

    /// Wires each pipeline's ready/error callback to update stored
    /// derivative state and fire `on_asset_updated`. Must be called once
    /// after the coordinator is placed behind an `Arc` — the callbacks
    /// close over a `Weak<Self>` (not a strong `Arc`), since the pipeline
    /// holding the callback is itself a field of `Self`; a strong reference
    /// here would keep the coordinator alive forever.
    pub fn attach(self: &Arc<Self>) {
        for kind in [DerivativeKind::Thumbnail, DerivativeKind::Preview] {
            let coordinator = Arc::downgrade(self);
            let coordinator_err = Arc::downgrade(self);
            let pipeline = self.pipeline_for(kind);
            pipeline.set_on_ready(Some(Arc::new(move |id, handle| {
                if let Some(coordinator) = coordinator.upgrade() {
                    coordinator.apply_derivative_result(&id, kind, Ok(handle));
                }
            })));
            pipeline.set_on_error(Some(Arc::new(move |id, message| {
                if let Some(coordinator) = coordinator_err.upgrade() {
                    coordinator.apply_derivative_result(&id, kind, Err(message));
                }
            })));
        }
    }

    fn pipeline_for(&self, kind: DerivativeKind) -> &Arc<DerivativePipeline<D>> {
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

    fn apply_derivative_result(
        &self,
        id: &AssetId,
        kind: DerivativeKind,
        result: std::result::Result<crate::model::DerivativeHandle, String>,
    ) {
        let state = match result {
            Ok(handle) => crate::model::DerivativeState::Ready(handle),
            Err(message) => crate::model::DerivativeState::Error(message),
        };
        let updated = {
            let mut assets = self.assets.write();
            match assets.get_mut(id) {
                Some(asset) => {
                    asset.set_derivative(kind, state);
                    let _ = self.store.set_derivative_state(id, kind, asset.derivative(kind));
                    Some(asset.clone())
                }
                None => None,
            }
        };
        if let Some(asset) = updated {
            self.fire_asset_updated(asset);
        }
    }

    fn set_state(&self, new_state: CoordinatorState) {
        *self.state.write() = new_state.clone();
        if let Some(callback) = self.on_state_changed.read().as_ref() {
            callback(new_state);
        }
    }

    fn fire_asset_updated(&self, asset: Asset) {
        if let Some(callback) = self.on_asset_updated.read().as_ref() {
            callback(asset);
        }
    }

    fn fire_assets_added(&self, assets: Vec<Asset>) {
        if let Some(callback) = self.on_assets_added.read().as_ref() {
            callback(assets);
        }
    }

    fn producer_for(&self, root: PathBuf, relative_path: String) -> BytesProducer {
        Arc::new(move || {
            let path = root.join(&relative_path);
            Box::pin(async move { Ok(tokio::fs::read(&path).await?) })
        })
    }

    /// Sets the current folder and projects its already-persisted assets
    /// into the in-memory map, firing `on_assets_added` once with the full
    /// restored batch (a fresh folder with no persisted assets yet fires
    /// nothing; the subsequent scan delivers its own batches).
    async fn ingest_folder(&self, root_path: String, record: FolderRecord, handle: Arc<dyn DirectoryHandle>) -> Result<()> {
        *self.current_folder.write() = Some(CurrentFolder {
            record: record.clone(),
            handle,
        });
        self.assets.write().clear();
        let restored = self.store.list_assets(record.key)?;
        {
            let mut assets = self.assets.write();
            for asset in &restored {
                assets.insert(asset.id.clone(), asset.clone());
            }
        }
        self.set_state(CoordinatorState::Ready);
        if !restored.is_empty() {
            self.fire_assets_added(restored);
        }
        let _ = root_path;
        Ok(())
    }

    /// Runs a scan of the current folder's root, ingesting discovered
    /// files in batches and removing catalogued assets whose files are no
    /// longer present.
    async fn run_scan(&self) -> Result<()> {
        if matches!(*self.state.read(), CoordinatorState::Scanning { .. }) {
            return Err(CatalogError::Unknown("scan already in progress".into()));
        }
        let (root_path, folder_key, batch_size) = {
            let current = self.current_folder.read();
            let current = current.as_ref().ok_or_else(|| CatalogError::FolderNotFound("no current folder".into()))?;
            (
                current.record.path.clone(),
                current.record.key,
                self.config.scan_batch_size,
            )
        };

        let token = CancellationToken::new();
        *self.scan_token.write() = Some(token.clone());
        self.set_state(CoordinatorState::Scanning { scanned: 0 });

        let mut rx = scan::scan(PathBuf::from(&root_path), token.clone(), batch_size);
        let mut scanned = 0usize;
        let mut seen_paths = Vec::new();
        let mut scan_error = None;

        while let Some(batch) = rx.recv().await {
            let batch = match batch {
                Ok(batch) => batch,
                Err(err) => {
                    scan_error = Some(err);
                    break;
                }
            };
            let mut new_assets = Vec::with_capacity(batch.len());
            for entry in &batch {
                seen_paths.push(entry.relative_path.clone());
            }
            for entry in batch {
                let existing = self
                    .assets
                    .read()
                    .values()
                    .find(|a| a.path == entry.relative_path)
                    .cloned();
                let mut asset = Asset::new_ingested(
                    folder_key,
                    entry.relative_path,
                    entry.filename,
                    entry.extension,
                    entry.byte_size,
                    entry.modified_instant,
                );
                if let Some(existing) = existing {
                    asset.id = existing.id;
                    asset.flag = existing.flag;
                    asset.capture_instant = existing.capture_instant;
                    asset.thumbnail = existing.thumbnail;
                    asset.preview = existing.preview;
                }
                new_assets.push(asset);
            }
            self.store.upsert_assets(&new_assets)?;
            scanned += new_assets.len();
            {
                let mut assets = self.assets.write();
                for asset in &new_assets {
                    assets.insert(asset.id.clone(), asset.clone());
                }
            }
            self.set_state(CoordinatorState::Scanning { scanned });
            if let Some(callback) = self.on_scan_progress.read().as_ref() {
                callback(scanned);
            }
            self.fire_assets_added(new_assets);
        }

        *self.scan_token.write() = None;

        if let Some(err) = scan_error {
            if err.is_scan_cancelled() {
                self.set_state(CoordinatorState::Ready);
                return Ok(());
            }
            warn!(%err, "scan failed");
            self.set_state(CoordinatorState::Error { message: err.to_string() });
            return Err(err);
        }

        let removed = self.store.delete_assets_not_in(folder_key, &seen_paths)?;
        if removed > 0 {
            let mut assets = self.assets.write();
            assets.retain(|_, asset| seen_paths.contains(&asset.path));
        }
        self.store.mark_folder_scanned(folder_key, OffsetDateTime::now_utc())?;
        info!(folder = %root_path, scanned, removed, "scan complete");
        self.set_state(CoordinatorState::Ready);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<D: Decoder + 'static> CatalogApi for Coordinator<D> {
    async fn choose_folder(&self) -> Result<()> {
        let Some(handle) = self.folder_picker.pick_folder().await? else {
            return Ok(());
        };
        let path = handle.lookup_key().to_string();
        let name = PathBuf::from(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        self.handles.put(&path, &path)?;
        let record = self.store.upsert_folder(&path, &name, &path)?;
        self.ingest_folder(path, record, handle).await?;
        self.run_scan().await
    }

    async fn open_recent_folder(&self, key: FolderKey) -> Result<()> {
        let record = self
            .store
            .get_folder(key)?
            .ok_or_else(|| CatalogError::FolderNotFound(format!("{key:?}")))?;
        let token = self
            .handles
            .get(&record.handle_lookup_key)
            .ok_or_else(|| CatalogError::PermissionDenied(record.path.clone()))?;
        let handle: Arc<dyn DirectoryHandle> = Arc::new(PathHandle::new(token));
        if handle.query_permission() != crate::collab::PermissionState::Granted {
            return Err(CatalogError::PermissionDenied(record.path.clone()));
        }
        let path = record.path.clone();
        self.ingest_folder(path, record, handle).await
    }

    async fn load_from_persistence(&self) -> Result<bool> {
        let Some(record) = self.store.list_folders()?.into_iter().next() else {
            return Ok(false);
        };
        let Some(token) = self.handles.get(&record.handle_lookup_key) else {
            return Ok(false);
        };
        let handle: Arc<dyn DirectoryHandle> = Arc::new(PathHandle::new(token));
        if handle.query_permission() != crate::collab::PermissionState::Granted {
            return Ok(false);
        }
        let path = record.path.clone();
        self.ingest_folder(path, record, handle).await?;
        Ok(true)
    }

    fn list_recent_folders(&self) -> Result<Vec<FolderSummary>> {
        let folders = self.store.list_folders()?;
        Ok(folders
            .into_iter()
            .map(|f| {
                let is_accessible = self
                    .handles
                    .get(&f.handle_lookup_key)
                    .map(|token| PathHandle::new(token).query_permission() == crate::collab::PermissionState::Granted)
                    .unwrap_or(false);
                FolderSummary {
                    key: f.key,
                    name: f.name,
                    path: f.path,
                    last_scan_instant: f.last_scan_instant,
                    is_accessible,
                }
            })
            .collect())
    }

    async fn rescan(&self) -> Result<()> {
        self.run_scan().await
    }

    fn cancel_scan(&self) {
        if let Some(token) = self.scan_token.read().as_ref() {
            token.cancel();
        }
    }

    fn current_state(&self) -> CoordinatorState {
        self.state.read().clone()
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.read().values().cloned().collect()
    }

    fn set_flag(&self, id: &AssetId, flag: AssetFlag) -> Result<()> {
        self.store.set_flag(id, flag)?;
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.flag = flag;
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            self.fire_asset_updated(asset);
        }
        Ok(())
    }

    fn set_flag_batch(&self, ids: &[AssetId], flag: AssetFlag) -> Result<()> {
        self.store.set_flags_batch(ids, flag)?;
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
            self.fire_asset_updated(asset);
        }
        Ok(())
    }

    fn counts_by_flag(&self) -> FlagCounts {
        counts_by_flag(self.assets.read().values())
    }

    fn save_edit_state(&self, id: &AssetId, payload: Vec<u8>) -> Result<()> {
        self.store.put_edit_state(&EditStateRecord {
            asset_id: id.clone(),
            schema_version: 1,
            updated_instant: OffsetDateTime::now_utc(),
            payload,
        })
    }

    fn load_edit_state(&self, id: &AssetId) -> Result<Option<EditStateRecord>> {
        self.store.get_edit_state(id)
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
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.set_derivative(kind, crate::model::DerivativeState::Pending);
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            self.fire_asset_updated(asset);
        }
    }

    fn regenerate(&self, id: &AssetId, kind: DerivativeKind, edit_payload: Bytes, priority: Priority) -> Result<()> {
        let (root, relative_path) = self.asset_location(id)?;
        let bytes = self.producer_for(root, relative_path);
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.set_derivative(kind, crate::model::DerivativeState::Loading);
                let _ = self.store.set_derivative_state(id, kind, asset.derivative(kind));
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            self.fire_asset_updated(asset);
        }
        self.pipeline_for(kind).regenerate(id.clone(), bytes, edit_payload, priority);
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
        self.cancel_scan();
        self.thumbnail_pipeline.cancel_all();
        self.preview_pipeline.cancel_all();
        self.thumbnail_cache.clear_memory();
        self.preview_cache.clear_memory();
        self.assets.write().clear();
        *self.current_folder.write() = None;
        self.set_state(CoordinatorState::Initializing);
    }
}

impl<D: Decoder + 'static> Coordinator<D> {
    fn request_derivative(&self, id: &AssetId, kind: DerivativeKind, priority: Priority) {
        let (root, relative_path) = match self.asset_location(id) {
            Ok(location) => location,
            Err(err) => {
                warn!(%id, %err, "cannot request derivative: asset not found");
                return;
            }
        };
        let bytes = self.producer_for(root, relative_path);
        let updated = {
            let mut assets = self.assets.write();
            assets.get_mut(id).map(|asset| {
                asset.set_derivative(kind, crate::model::DerivativeState::Loading);
                let _ = self.store.set_derivative_state(id, kind, asset.derivative(kind));
                asset.clone()
            })
        };
        if let Some(asset) = updated {
            self.fire_asset_updated(asset);
        }
        self.pipeline_for(kind).request(id.clone(), bytes, priority);
    }

    fn asset_location(&self, id: &AssetId) -> Result<(PathBuf, String)> {
        let current = self.current_folder.read();
        let current = current
            .as_ref()
            .ok_or_else(|| CatalogError::FolderNotFound("no current folder".into()))?;
        let assets = self.assets.read();
        let asset = assets
            .get(id)
            .ok_or_else(|| CatalogError::Unknown(format!("unknown asset {id}")))?;
        Ok((PathBuf::from(&current.record.path), asset.path.clone()))
    }
}
