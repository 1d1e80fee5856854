//! Data models shared across the catalog coordinator.
//!
//! This module defines the asset/folder/edit-state shapes described in the
//! data model: the in-memory projection the UI renders, the persistent
//! record shapes the store round-trips, and the small value types
//! (identifiers, flags, derivative state) that thread through the pipeline,
//! cache, and persistence layers.

use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque, cross-process-stable identifier for an asset. Generated at
/// ingestion and never reused, per the data model invariants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    /// Generates a fresh, practically-unique identifier.
    ///
    /// Not a cryptographic token: it only needs to be unique within the
    /// process and the persistent store, not secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Self(format!("{millis:x}-{}", hex_encode(&bytes)))
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Internal, store-private key for a folder record. Never exposed across
/// the coordinator's public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderKey(pub i64);

/// User annotation applied to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssetFlag {
    /// No annotation (the default).
    #[default]
    None,
    /// Marked as a keeper.
    Pick,
    /// Marked for exclusion.
    Reject,
}

/// Opaque, lifetime-managed reference to a rendered derivative that the UI
/// can consume directly (a URL or local path equivalent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeHandle(pub Arc<str>);

impl DerivativeHandle {
    /// Wraps a path/URL string as a handle.
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DerivativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four-valued derivative lifecycle from the data model, folded into one
/// enum instead of a `(state, Option<handle>)` pair — the handle only ever
/// exists in the `Ready` state, so the enum shape makes the invalid
/// combinations unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivativeState {
    /// Not yet requested, or invalidated back to baseline.
    Pending,
    /// Queued or in flight in the corresponding pipeline.
    Loading,
    /// Rendered and cached; the UI can render the handle immediately.
    Ready(DerivativeHandle),
    /// Generation failed; the UI should render a placeholder.
    Error(String),
}

impl DerivativeState {
    /// The cached handle, if this asset's derivative is ready.
    pub fn handle(&self) -> Option<&DerivativeHandle> {
        match self {
            Self::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    /// True if this derivative has neither output nor in-flight work.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl Default for DerivativeState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Which derivative kind a pipeline/cache/request concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivativeKind {
    /// Small grid thumbnail.
    Thumbnail,
    /// Larger single-photo-editor preview.
    Preview,
}

impl DerivativeKind {
    /// Short lowercase label, used for cache directory names and logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Preview => "preview",
        }
    }
}

/// The in-memory, live projection of an asset the UI reads. Replaced
/// (never mutated in place) on any state-changing operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// Stable, process-unique identifier.
    pub id: AssetId,
    /// Owning folder's internal key.
    pub folder_key: FolderKey,
    /// Path relative to the folder root.
    pub path: String,
    /// Base filename (final path segment).
    pub filename: String,
    /// Lowercase extension, without the leading dot.
    pub extension: String,
    /// User annotation.
    pub flag: AssetFlag,
    /// EXIF capture instant, when known. Left `None` on ingest today — see
    /// the open question on EXIF extraction.
    pub capture_instant: Option<OffsetDateTime>,
    /// Filesystem modification instant at last scan.
    pub modified_instant: OffsetDateTime,
    /// File size in bytes.
    pub byte_size: u64,
    /// Pixel dimensions, when known.
    pub dimensions: Option<(u32, u32)>,
    /// Thumbnail derivative lifecycle.
    pub thumbnail: DerivativeState,
    /// Preview derivative lifecycle.
    pub preview: DerivativeState,
}

impl Asset {
    /// Builds a fresh projection for a newly-ingested file, with both
    /// derivative states at their baseline and no annotation.
    pub fn new_ingested(
        folder_key: FolderKey,
        path: String,
        filename: String,
        extension: String,
        byte_size: u64,
        modified_instant: OffsetDateTime,
    ) -> Self {
        Self {
            id: AssetId::generate(),
            folder_key,
            path,
            filename,
            extension,
            flag: AssetFlag::None,
            capture_instant: None,
            modified_instant,
            byte_size,
            dimensions: None,
            thumbnail: DerivativeState::Pending,
            preview: DerivativeState::Pending,
        }
    }

    /// Returns the derivative state for the given kind.
    pub fn derivative(&self, kind: DerivativeKind) -> &DerivativeState {
        match kind {
            DerivativeKind::Thumbnail => &self.thumbnail,
            DerivativeKind::Preview => &self.preview,
        }
    }

    /// Sets the derivative state for the given kind.
    pub fn set_derivative(&mut self, kind: DerivativeKind, state: DerivativeState) {
        match kind {
            DerivativeKind::Thumbnail => self.thumbnail = state,
            DerivativeKind::Preview => self.preview = state,
        }
    }
}

/// Persistent folder record.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderRecord {
    /// Store-internal key.
    pub key: FolderKey,
    /// Absolute or user-chosen root path (unique).
    pub path: String,
    /// Display name shown in "recent folders".
    pub name: String,
    /// Key under which the opaque directory handle is stored in the handle
    /// store.
    pub handle_lookup_key: String,
    /// Instant of the last successful full scan.
    pub last_scan_instant: Option<OffsetDateTime>,
}

/// Summary returned by "list recent folders", enriched with a
/// non-interactive accessibility probe.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderSummary {
    /// Store-internal key.
    pub key: FolderKey,
    /// Display name.
    pub name: String,
    /// Root path.
    pub path: String,
    /// Instant of the last successful full scan.
    pub last_scan_instant: Option<OffsetDateTime>,
    /// Whether the folder's handle currently has granted permission,
    /// without prompting.
    pub is_accessible: bool,
}

/// Persistent edit-state record. The payload is opaque to the catalog; it
/// round-trips to the editor unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditStateRecord {
    /// Owning asset.
    pub asset_id: AssetId,
    /// Schema version of `payload`, interpreted only by the editor.
    pub schema_version: u32,
    /// Instant of last update.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_instant: OffsetDateTime,
    /// Opaque serialized edit payload.
    pub payload: Vec<u8>,
}

/// Flag tallies over the in-memory asset map, as returned by
/// `CatalogApi::counts_by_flag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagCounts {
    /// Total catalogued assets.
    pub all: usize,
    /// Assets flagged `Pick`.
    pub picks: usize,
    /// Assets flagged `Reject`.
    pub rejects: usize,
    /// Assets with no flag.
    pub unflagged: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_ids_are_unique() {
        let a = AssetId::generate();
        let b = AssetId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn derivative_state_handle_only_present_when_ready() {
        assert_eq!(DerivativeState::Pending.handle(), None);
        assert_eq!(DerivativeState::Loading.handle(), None);
        assert_eq!(DerivativeState::Error("x".into()).handle(), None);
        let handle = DerivativeHandle::new("blob://a");
        assert_eq!(
            DerivativeState::Ready(handle.clone()).handle(),
            Some(&handle)
        );
    }

    #[test]
    fn asset_new_ingested_defaults() {
        let asset = Asset::new_ingested(
            FolderKey(1),
            "sub/B.ARW".into(),
            "B.ARW".into(),
            "arw".into(),
            8192,
            OffsetDateTime::UNIX_EPOCH,
        );
        assert_eq!(asset.flag, AssetFlag::None);
        assert!(asset.capture_instant.is_none());
        assert!(asset.thumbnail.is_pending());
        assert!(asset.preview.is_pending());
    }
}
