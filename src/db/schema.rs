//! Versioned schema migrations for the catalog store, applied in order
//! against `PRAGMA user_version`, following the same checkpoint/upgrade
//! discipline used elsewhere in this crate for on-disk format changes.

use rusqlite::{Connection, Transaction};

use crate::error::Result;

/// One migration step: the schema version it produces, and the SQL that
/// gets there from the previous version.
struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
            CREATE TABLE folders (
                key                 INTEGER PRIMARY KEY AUTOINCREMENT,
                path                TEXT NOT NULL UNIQUE,
                name                TEXT NOT NULL,
                handle_lookup_key   TEXT NOT NULL,
                last_scan_instant   TEXT
            );

            CREATE TABLE assets (
                id                  TEXT PRIMARY KEY,
                folder_key          INTEGER NOT NULL REFERENCES folders(key) ON DELETE CASCADE,
                path                TEXT NOT NULL,
                filename            TEXT NOT NULL,
                extension           TEXT NOT NULL,
                flag                TEXT NOT NULL DEFAULT 'none',
                capture_instant     TEXT,
                modified_instant    TEXT NOT NULL,
                byte_size           INTEGER NOT NULL,
                width               INTEGER,
                height              INTEGER,
                thumbnail_state     TEXT NOT NULL DEFAULT 'pending',
                thumbnail_handle    TEXT,
                thumbnail_error     TEXT,
                preview_state       TEXT NOT NULL DEFAULT 'pending',
                preview_handle      TEXT,
                preview_error       TEXT,
                UNIQUE(folder_key, path)
            );

            CREATE INDEX idx_assets_folder_key ON assets(folder_key);

            CREATE TABLE edit_states (
                asset_id            TEXT PRIMARY KEY REFERENCES assets(id) ON DELETE CASCADE,
                schema_version      INTEGER NOT NULL,
                updated_instant     TEXT NOT NULL,
                payload             BLOB NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        sql: r#"
            CREATE INDEX idx_folders_last_scan_instant ON folders(last_scan_instant);
            CREATE INDEX idx_assets_flag ON assets(flag);
            CREATE INDEX idx_assets_capture_instant ON assets(capture_instant);
            CREATE INDEX idx_assets_flag_capture_instant ON assets(flag, capture_instant);
            CREATE INDEX idx_assets_folder_key_capture_instant ON assets(folder_key, capture_instant);
        "#,
    },
];

/// Opens (or creates) the schema at the latest version, applying any
/// migrations the existing database hasn't seen yet.
pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let tx: Transaction = conn.transaction()?;
    let mut applied = current;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        applied = migration.version;
    }
    tx.pragma_update(None, "user_version", applied)?;
    tx.commit()?;
    Ok(())
}
