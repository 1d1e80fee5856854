//! Interfaces to collaborators the catalog coordinates but does not own:
//! the decode worker, the folder picker, and the opaque directory-handle
//! capability. Each is a trait so the coordinator's behavior is testable
//! against stub implementations and portable to a real decoder/picker
//! without touching catalog logic.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// A lazily-invoked source of raw file bytes. Both the scan pipeline and the
/// derivative pipeline accept these instead of eagerly reading files, so a
/// caller can defer I/O until an asset is actually requested.
pub type BytesProducer =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send>> + Send + Sync>;

/// Opaque, possibly-revocable permission to read a directory. Carried by the
/// coordinator's current-folder state and handed to the scan pipeline; the
/// catalog never inspects its contents directly.
pub trait DirectoryHandle: Send + Sync {
    /// Stable string the handle store can persist and later look up by.
    fn lookup_key(&self) -> &str;

    /// Probes current permission without prompting the user/OS.
    fn query_permission(&self) -> PermissionState;

    /// Requests permission, possibly prompting. Returns the resulting state.
    fn request_permission(&self) -> PermissionState;
}

/// Result of a permission probe or request against a [`DirectoryHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// Read access is currently granted.
    Granted,
    /// Read access has been denied or was never granted.
    Denied,
}

/// Default, environment-agnostic `DirectoryHandle`: a bare path string with
/// permission always reported as granted. Suitable for any environment
/// without real OS capability tokens (the default assumed by this crate);
/// a host with real per-directory ACLs can supply its own impl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHandle {
    path: String,
}

impl PathHandle {
    /// Wraps a filesystem path as a handle.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Borrows the wrapped path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl DirectoryHandle for PathHandle {
    fn lookup_key(&self) -> &str {
        &self.path
    }

    fn query_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn request_permission(&self) -> PermissionState {
        PermissionState::Granted
    }
}

/// Lets the coordinator ask the host environment to prompt the user to
/// choose a folder, returning a handle to it.
#[async_trait::async_trait]
pub trait FolderPicker: Send + Sync {
    /// Prompts the user to choose a directory. Returns `None` if the user
    /// cancels the prompt.
    async fn pick_folder(&self) -> Result<Option<Arc<dyn DirectoryHandle>>>;
}

/// Renders thumbnails and previews from source bytes. The only collaborator
/// the derivative pipeline depends on; entirely out of scope to implement
/// here — format parsing, demosaicing, and color management are assumed to
/// live behind this trait in a real deployment. Every operation takes the
/// long-edge `target_size` in pixels the pipeline was configured with
/// (`Config::thumbnail_target_px`/`preview_target_px`), since bytes alone
/// don't tell a decoder which of the two derivative kinds it's rendering.
#[async_trait::async_trait]
pub trait Decoder: Send + Sync {
    /// Renders a thumbnail from the unedited source bytes, scaled so its
    /// long edge is `target_size` pixels.
    async fn render_thumbnail(&self, source: Bytes, target_size: u32) -> Result<Bytes>;

    /// Renders a thumbnail reflecting a caller-supplied edit-state payload,
    /// scaled so its long edge is `target_size` pixels.
    async fn render_edited_thumbnail(&self, source: Bytes, edit_payload: Bytes, target_size: u32) -> Result<Bytes>;

    /// Renders a full preview from the unedited source bytes, optionally
    /// reflecting an edit-state payload when present, scaled so its long
    /// edge is `target_size` pixels.
    async fn render_preview(&self, source: Bytes, edit_payload: Option<Bytes>, target_size: u32) -> Result<Bytes>;
}
