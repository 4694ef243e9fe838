//! On-disk schema for the sync state store.
//!
//! Migration only ever creates what is missing; existing rows are never
//! touched, so opening an old store is always safe.

use rusqlite::Connection;

/// Schema version recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id TEXT NOT NULL,
        source_path TEXT NOT NULL,
        local_path TEXT NOT NULL DEFAULT '',   -- '' = no guaranteed local copy
        size INTEGER NOT NULL DEFAULT 0,
        mtime INTEGER NOT NULL DEFAULT 0,      -- Unix seconds, as listed by the source
        pulled_at TEXT,
        UNIQUE(source_id, source_path)
    );

    CREATE TABLE IF NOT EXISTS dest_syncs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL,
        destination TEXT NOT NULL,
        synced_at TEXT NOT NULL,
        FOREIGN KEY (file_id) REFERENCES files(id),
        UNIQUE(file_id, destination)
    );

    CREATE INDEX IF NOT EXISTS idx_files_source ON files(source_id);
    CREATE INDEX IF NOT EXISTS idx_dest_syncs_file ON dest_syncs(file_id);
"#;

/// Create any missing tables and indexes, then stamp the schema version.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;

    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}
