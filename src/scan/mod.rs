//! Cancellable recursive directory scan. Walks a folder depth-first,
//! filters to supported extensions, and delivers discovered files in
//! batches over a channel so the coordinator can start ingesting before the
//! whole tree has been read.

mod token;

pub use token::CancellationToken;

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::future::Future;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::collab::BytesProducer;
use crate::error::{CatalogError, Result};

/// Extensions the catalog recognizes as photo/raw assets. A single point of
/// change per the external-interfaces contract.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "arw"];

/// Default number of entries delivered per scan batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// A single discovered file, not yet assigned a catalog identity.
pub struct ScannedEntry {
    /// Path relative to the scan root.
    pub relative_path: String,
    /// Base filename.
    pub filename: String,
    /// Lowercase extension, without the leading dot.
    pub extension: String,
    /// File size in bytes at scan time.
    pub byte_size: u64,
    /// Filesystem modification instant at scan time.
    pub modified_instant: OffsetDateTime,
    /// Lazy source-byte producer, reading from the absolute path at
    /// invocation time rather than eagerly.
    pub bytes: BytesProducer,
}

/// Starts an async recursive scan of `root`, returning a channel of
/// batches. The scan stops early, without error, if `token` is cancelled;
/// a genuine I/O failure (permission, not-found) ends the stream with an
/// `Err` batch.
pub fn scan(root: impl Into<PathBuf>, token: CancellationToken, batch_size: usize) -> mpsc::Receiver<Result<Vec<ScannedEntry>>> {
    let root = root.into();
    let batch_size = batch_size.max(1);
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        let mut batch = Vec::with_capacity(batch_size);
        let result = walk(&root, &root, &token, &mut batch, &tx, batch_size).await;
        if !batch.is_empty() && !token.is_cancelled() {
            let _ = tx.send(Ok(std::mem::take(&mut batch))).await;
        }
        if let Err(err) = result {
            if !err.is_scan_cancelled() {
                let _ = tx.send(Err(err)).await;
            }
        }
    });
    rx
}

fn walk<'a>(
    root: &'a Path,
    dir: &'a Path,
    token: &'a CancellationToken,
    batch: &'a mut Vec<ScannedEntry>,
    tx: &'a mpsc::Sender<Result<Vec<ScannedEntry>>>,
    batch_size: usize,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if token.is_cancelled() {
            return Err(CatalogError::ScanCancelled);
        }
        let mut entries = tokio::fs::read_dir(dir).await.map_err(map_io_error)?;
        loop {
            if token.is_cancelled() {
                return Err(CatalogError::ScanCancelled);
            }
            let entry = match entries.next_entry().await.map_err(map_io_error)? {
                Some(entry) => entry,
                None => break,
            };
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable entry");
                    continue;
                }
            };
            if metadata.is_dir() {
                walk(root, &path, token, batch, tx, batch_size).await?;
                continue;
            }
            if !metadata.is_file() {
                continue;
            }
            let Some(ext) = extension_of(&path) else {
                continue;
            };
            if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            let relative_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let modified_instant = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or_else(|_| OffsetDateTime::now_utc());
            let byte_size = metadata.len();
            let producer_path = path.clone();
            let bytes: BytesProducer = Arc::new(move || {
                let path = producer_path.clone();
                Box::pin(async move { Ok(tokio::fs::read(&path).await?) })
            });
            batch.push(ScannedEntry {
                relative_path,
                filename,
                extension: ext,
                byte_size,
                modified_instant,
                bytes,
            });
            if batch.len() >= batch_size {
                debug!(dir = %dir.display(), count = batch.len(), "delivering scan batch");
                if tx.send(Ok(std::mem::take(batch))).await.is_err() {
                    return Err(CatalogError::ScanCancelled);
                }
            }
        }
        Ok(())
    })
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn map_io_error(err: std::io::Error) -> CatalogError {
    CatalogError::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn discovers_supported_extensions_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("b.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.ARW"), b"x").unwrap();

        let token = CancellationToken::new();
        let mut rx = scan(dir.path().to_path_buf(), token, 50);
        let mut found = Vec::new();
        while let Some(batch) = rx.recv().await {
            found.extend(batch.unwrap());
        }
        let mut names: Vec<_> = found.iter().map(|e| e.filename.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg".to_string(), "c.ARW".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..500 {
            fs::write(dir.path().join(format!("{i}.jpg")), b"x").unwrap();
        }
        let token = CancellationToken::new();
        token.cancel();
        let mut rx = scan(dir.path().to_path_buf(), token, 50);
        let mut found = Vec::new();
        while let Some(batch) = rx.recv().await {
            found.extend(batch.unwrap());
        }
        assert!(found.len() < 500);
    }

    #[tokio::test]
    async fn missing_root_reports_folder_not_found() {
        let token = CancellationToken::new();
        let mut rx = scan(PathBuf::from("/definitely/not/a/real/path"), token, 50);
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, Err(CatalogError::FolderNotFound(_))));
    }
}
