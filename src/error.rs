//! Crate-wide error taxonomy.
//!
//! `CatalogError` collapses every failure surfaced by the coordinator and
//! its components into the coded taxonomy the catalog's callers (the UI
//! layer) are expected to branch on, per the error table in the system
//! design. Collaborator-local errors (scan, persistence) convert into it via
//! `#[from]` so a caller never has to match on a collaborator's own error
//! type.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Coded error taxonomy surfaced by public coordinator operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The folder picker was unavailable, or the user/OS refused permission.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// An operation required a current folder, or referenced folder was missing.
    #[error("folder not found: {0}")]
    FolderNotFound(String),

    /// Cancellation was observed during a scan. Recovered silently by the
    /// coordinator; callers should not normally see this escape `scan`.
    #[error("scan cancelled")]
    ScanCancelled,

    /// Persistence read/write failure.
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Persistent cache write failed for capacity reasons. Never surfaced to
    /// a caller directly — logged and the cache degrades to memory-only.
    #[error("persistent cache storage full: {0}")]
    StorageFull(String),

    /// Derivative generation failed, either in the caller-supplied producer
    /// or in the decoder collaborator.
    #[error("thumbnail/preview generation failed: {0}")]
    ThumbnailError(String),

    /// Any unclassified condition, including "operation already in progress".
    #[error("{0}")]
    Unknown(String),
}

impl CatalogError {
    /// Wraps an arbitrary error as a [`CatalogError::Database`].
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Database(Box::new(err))
    }

    /// True if this error should be swallowed rather than surfaced, per the
    /// propagation policy (scan cancellation is recovered by the
    /// coordinator, never rethrown to its caller).
    pub fn is_scan_cancelled(&self) -> bool {
        matches!(self, Self::ScanCancelled)
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database(err)
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::FolderNotFound(err.to_string()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::database(err),
        }
    }
}
