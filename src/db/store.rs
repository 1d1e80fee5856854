//! SQLite-backed catalog store: folders, assets, and edit states. Opened
//! with WAL journaling and foreign keys on for a durable-by-default posture,
//! through `rusqlite` rather than a hand-rolled page store.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use crate::error::{CatalogError, Result};
use crate::model::{
    Asset, AssetFlag, AssetId, DerivativeHandle, DerivativeKind, DerivativeState, EditStateRecord,
    FolderKey, FolderRecord,
};

use super::schema;

/// Embedded catalog store, one SQLite file per library.
pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    /// Opens (creating if absent) the store at `path`, applying schema
    /// migrations and enabling WAL journaling.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store, for tests and the demo binary's
    /// non-persistent mode.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts a new folder record, or returns the existing one if `path`
    /// is already catalogued.
    pub fn upsert_folder(
        &self,
        path: &str,
        name: &str,
        handle_lookup_key: &str,
    ) -> Result<FolderRecord> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO folders (path, name, handle_lookup_key) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET name = excluded.name",
            params![path, name, handle_lookup_key],
        )?;
        conn.query_row(
            "SELECT key, path, name, handle_lookup_key, last_scan_instant FROM folders WHERE path = ?1",
            params![path],
            row_to_folder,
        )
        .map_err(CatalogError::from)
    }

    /// Looks up a folder by its store-internal key.
    pub fn get_folder(&self, key: FolderKey) -> Result<Option<FolderRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT key, path, name, handle_lookup_key, last_scan_instant FROM folders WHERE key = ?1",
            params![key.0],
            row_to_folder,
        )
        .optional()
        .map_err(CatalogError::from)
    }

    /// Lists every catalogued folder, most-recently-scanned first.
    pub fn list_folders(&self) -> Result<Vec<FolderRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, path, name, handle_lookup_key, last_scan_instant FROM folders
             ORDER BY last_scan_instant DESC NULLS LAST",
        )?;
        let rows = stmt.query_map([], row_to_folder)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CatalogError::from)
    }

    /// Removes a folder and (via `ON DELETE CASCADE`) its assets and edit
    /// states.
    pub fn delete_folder(&self, key: FolderKey) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM folders WHERE key = ?1", params![key.0])?;
        Ok(())
    }

    /// Records the instant a folder finished a full scan.
    pub fn mark_folder_scanned(&self, key: FolderKey, instant: OffsetDateTime) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE folders SET last_scan_instant = ?1 WHERE key = ?2",
            params![rfc3339(instant), key.0],
        )?;
        Ok(())
    }

    /// Inserts newly-discovered assets, or updates the mutable scan-derived
    /// fields (size, modified instant) of ones already catalogued at the
    /// same folder/path, leaving flags and derivative state untouched.
    pub fn upsert_assets(&self, assets: &[Asset]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for asset in assets {
            tx.execute(
                "INSERT INTO assets (
                    id, folder_key, path, filename, extension, flag,
                    capture_instant, modified_instant, byte_size, width, height,
                    thumbnail_state, thumbnail_handle, thumbnail_error,
                    preview_state, preview_handle, preview_error
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(folder_key, path) DO UPDATE SET
                    byte_size = excluded.byte_size,
                    modified_instant = excluded.modified_instant",
                params![
                    asset.id.as_str(),
                    asset.folder_key.0,
                    asset.path,
                    asset.filename,
                    asset.extension,
                    flag_to_str(asset.flag),
                    asset.capture_instant.map(rfc3339),
                    rfc3339(asset.modified_instant),
                    asset.byte_size as i64,
                    asset.dimensions.map(|(w, _)| w as i64),
                    asset.dimensions.map(|(_, h)| h as i64),
                    derivative_state_col(&asset.thumbnail),
                    derivative_handle_col(&asset.thumbnail),
                    derivative_error_col(&asset.thumbnail),
                    derivative_state_col(&asset.preview),
                    derivative_handle_col(&asset.preview),
                    derivative_error_col(&asset.preview),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Deletes assets belonging to `folder_key` whose relative path is not
    /// in `keep_paths`, used by rescan to drop assets for files removed from
    /// disk since the last scan.
    pub fn delete_assets_not_in(&self, folder_key: FolderKey, keep_paths: &[String]) -> Result<usize> {
        let conn = self.conn.lock();
        if keep_paths.is_empty() {
            let removed = conn.execute(
                "DELETE FROM assets WHERE folder_key = ?1",
                params![folder_key.0],
            )?;
            return Ok(removed);
        }
        let placeholders = keep_paths.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "DELETE FROM assets WHERE folder_key = ? AND path NOT IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(keep_paths.len() + 1);
        bound.push(&folder_key.0);
        for path in keep_paths {
            bound.push(path);
        }
        let removed = stmt.execute(bound.as_slice())?;
        Ok(removed)
    }

    /// Lists every asset belonging to a folder.
    pub fn list_assets(&self, folder_key: FolderKey) -> Result<Vec<Asset>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, folder_key, path, filename, extension, flag, capture_instant,
                    modified_instant, byte_size, width, height,
                    thumbnail_state, thumbnail_handle, thumbnail_error,
                    preview_state, preview_handle, preview_error
             FROM assets WHERE folder_key = ?1 ORDER BY path",
        )?;
        let rows = stmt.query_map(params![folder_key.0], row_to_asset)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CatalogError::from)
    }

    /// Updates a single asset's user-facing flag.
    pub fn set_flag(&self, id: &AssetId, flag: AssetFlag) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE assets SET flag = ?1 WHERE id = ?2",
            params![flag_to_str(flag), id.as_str()],
        )?;
        Ok(())
    }

    /// Updates the flag of every asset in `ids` in a single transaction.
    pub fn set_flags_batch(&self, ids: &[AssetId], flag: AssetFlag) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE assets SET flag = ?1 WHERE id = ?2")?;
            for id in ids {
                stmt.execute(params![flag_to_str(flag), id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Updates a single asset's derivative lifecycle for one kind.
    pub fn set_derivative_state(
        &self,
        id: &AssetId,
        kind: DerivativeKind,
        state: &DerivativeState,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let (state_col, handle_col, error_col) = match kind {
            DerivativeKind::Thumbnail => (
                "thumbnail_state",
                "thumbnail_handle",
                "thumbnail_error",
            ),
            DerivativeKind::Preview => ("preview_state", "preview_handle", "preview_error"),
        };
        let sql = format!(
            "UPDATE assets SET {state_col} = ?1, {handle_col} = ?2, {error_col} = ?3 WHERE id = ?4"
        );
        conn.execute(
            &sql,
            params![
                derivative_state_col(state),
                derivative_handle_col(state),
                derivative_error_col(state),
                id.as_str()
            ],
        )?;
        Ok(())
    }

    /// Reads the stored edit state for an asset, if any.
    pub fn get_edit_state(&self, id: &AssetId) -> Result<Option<EditStateRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT asset_id, schema_version, updated_instant, payload FROM edit_states WHERE asset_id = ?1",
            params![id.as_str()],
            row_to_edit_state,
        )
        .optional()
        .map_err(CatalogError::from)
    }

    /// Writes (inserting or replacing) an asset's edit state.
    pub fn put_edit_state(&self, record: &EditStateRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO edit_states (asset_id, schema_version, updated_instant, payload)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(asset_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                updated_instant = excluded.updated_instant,
                payload = excluded.payload",
            params![
                record.asset_id.as_str(),
                record.schema_version,
                rfc3339(record.updated_instant),
                record.payload
            ],
        )?;
        Ok(())
    }
}

fn flag_to_str(flag: AssetFlag) -> &'static str {
    match flag {
        AssetFlag::None => "none",
        AssetFlag::Pick => "pick",
        AssetFlag::Reject => "reject",
    }
}

fn flag_from_str(s: &str) -> AssetFlag {
    match s {
        "pick" => AssetFlag::Pick,
        "reject" => AssetFlag::Reject,
        _ => AssetFlag::None,
    }
}

fn rfc3339(instant: OffsetDateTime) -> String {
    instant
        .format(&time::format_description::well_known::Rfc3339)
        .expect("OffsetDateTime always formats as rfc3339")
}

fn parse_rfc3339(s: &str) -> OffsetDateTime {
    OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn derivative_state_col(state: &DerivativeState) -> &'static str {
    match state {
        DerivativeState::Pending => "pending",
        DerivativeState::Loading => "loading",
        DerivativeState::Ready(_) => "ready",
        DerivativeState::Error(_) => "error",
    }
}

fn derivative_handle_col(state: &DerivativeState) -> Option<String> {
    state.handle().map(|h| h.as_str().to_string())
}

fn derivative_error_col(state: &DerivativeState) -> Option<&str> {
    match state {
        DerivativeState::Error(message) => Some(message.as_str()),
        _ => None,
    }
}

fn derivative_state_from_cols(state: &str, handle: Option<String>, error: Option<String>) -> DerivativeState {
    match state {
        "loading" => DerivativeState::Loading,
        "ready" => match handle {
            Some(handle) => DerivativeState::Ready(DerivativeHandle::new(handle)),
            None => DerivativeState::Pending,
        },
        "error" => DerivativeState::Error(error.unwrap_or_default()),
        _ => DerivativeState::Pending,
    }
}

fn row_to_folder(row: &Row<'_>) -> rusqlite::Result<FolderRecord> {
    let last_scan: Option<String> = row.get(4)?;
    Ok(FolderRecord {
        key: FolderKey(row.get(0)?),
        path: row.get(1)?,
        name: row.get(2)?,
        handle_lookup_key: row.get(3)?,
        last_scan_instant: last_scan.map(|s| parse_rfc3339(&s)),
    })
}

fn row_to_asset(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let capture: Option<String> = row.get(6)?;
    let modified: String = row.get(7)?;
    let width: Option<i64> = row.get(9)?;
    let height: Option<i64> = row.get(10)?;
    let thumb_state: String = row.get(11)?;
    let thumb_handle: Option<String> = row.get(12)?;
    let thumb_error: Option<String> = row.get(13)?;
    let preview_state: String = row.get(14)?;
    let preview_handle: Option<String> = row.get(15)?;
    let preview_error: Option<String> = row.get(16)?;
    let flag: String = row.get(5)?;

    Ok(Asset {
        id: AssetId(row.get(0)?),
        folder_key: FolderKey(row.get(1)?),
        path: row.get(2)?,
        filename: row.get(3)?,
        extension: row.get(4)?,
        flag: flag_from_str(&flag),
        capture_instant: capture.map(|s| parse_rfc3339(&s)),
        modified_instant: parse_rfc3339(&modified),
        byte_size: row.get::<_, i64>(8)? as u64,
        dimensions: match (width, height) {
            (Some(w), Some(h)) => Some((w as u32, h as u32)),
            _ => None,
        },
        thumbnail: derivative_state_from_cols(&thumb_state, thumb_handle, thumb_error),
        preview: derivative_state_from_cols(&preview_state, preview_handle, preview_error),
    })
}

fn row_to_edit_state(row: &Row<'_>) -> rusqlite::Result<EditStateRecord> {
    let updated: String = row.get(2)?;
    Ok(EditStateRecord {
        asset_id: AssetId(row.get(0)?),
        schema_version: row.get(1)?,
        updated_instant: parse_rfc3339(&updated),
        payload: row.get(3)?,
    })
}
