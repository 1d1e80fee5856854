//! Opaque directory-handle store: a single JSON map file, deliberately kept
//! separate from the SQLite catalog store so the two persistence concerns
//! (typed catalog records vs. opaque capability tokens) don't share a
//! schema or a backend API, matching the data model's "two independent
//! stores" requirement.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HandleMap {
    entries: HashMap<String, String>,
}

/// JSON-file-backed key/value store for opaque directory-handle tokens,
/// keyed by the same `handle_lookup_key` a folder record carries.
pub struct HandleStore {
    path: PathBuf,
    map: Mutex<HandleMap>,
}

impl HandleStore {
    /// Opens (or initializes) the handle store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = if path.exists() {
            let raw = std::fs::read(&path)?;
            serde_json::from_slice(&raw).unwrap_or_default()
        } else {
            HandleMap::default()
        };
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    /// Stores the serialized token for `key`, persisting immediately via
    /// temp-file-then-rename.
    pub fn put(&self, key: &str, token: &str) -> Result<()> {
        {
            let mut map = self.map.lock();
            map.entries.insert(key.to_string(), token.to_string());
        }
        self.flush()
    }

    /// Reads the serialized token for `key`, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.map.lock().entries.get(key).cloned()
    }

    /// Removes a stored token, persisting immediately.
    pub fn remove(&self, key: &str) -> Result<()> {
        {
            let mut map = self.map.lock();
            map.entries.remove(key);
        }
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let map = self.map.lock();
        let json = serde_json::to_vec_pretty(&*map).map_err(|e| crate::error::CatalogError::Unknown(e.to_string()))?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| crate::error::CatalogError::database(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = HandleStore::open(dir.path().join("handles.json")).unwrap();
        store.put("/photos", "token-abc").unwrap();
        assert_eq!(store.get("/photos"), Some("token-abc".to_string()));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handles.json");
        {
            let store = HandleStore::open(&path).unwrap();
            store.put("/photos", "token-abc").unwrap();
        }
        let reopened = HandleStore::open(&path).unwrap();
        assert_eq!(reopened.get("/photos"), Some("token-abc".to_string()));
    }

    #[test]
    fn remove_clears_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = HandleStore::open(dir.path().join("handles.json")).unwrap();
        store.put("/photos", "token-abc").unwrap();
        store.remove("/photos").unwrap();
        assert_eq!(store.get("/photos"), None);
    }
}
