//! Durable sync state backed by SQLite.
//!
//! Every idempotency decision of the pull, push and stream loops goes through
//! this store. All writes are single conflict-resolving statements, so an
//! interrupted run leaves the store in a state the next run can resume from.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::error::StoreError;
use super::record::{DestinationSyncRecord, FileId, FileRecord, SourceStats};
use super::schema;

/// File name of the store inside the configuration directory.
pub const STORE_FILE_NAME: &str = "manifest.db";

/// How long a statement waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Modification time no real listing reports.
const STALE_MTIME: i64 = i64::MIN;

const FILE_COLUMNS: &str =
    "f.id, f.source_id, f.source_path, f.local_path, f.size, f.mtime, f.pulled_at";

/// Persistent record of pulled files and their per-destination uploads.
pub struct StateStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl StateStore {
    /// Open (or create) the store at `path`, creating its directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(e, "creating directory for", parent))?;
        }

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        // WAL lets a status query in another process read while a sync writes.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let store = Self::init(conn, Some(path.to_path_buf())).map_err(|e| match e {
            StoreError::Sqlite(source) => StoreError::Open {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        debug!(path = %path.display(), "opened state store");
        Ok(store)
    }

    /// Open the store file inside a configuration directory.
    pub fn open_in_dir(config_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(config_dir.as_ref().join(STORE_FILE_NAME))
    }

    /// A throwaway store that lives only as long as the value.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&conn)?;
        Ok(Self { conn, path })
    }

    /// Location of the store file; `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ===== Pull side =====

    /// Whether `(source_id, source_path)` was pulled with exactly this size
    /// and modification time. Any difference means the file changed since.
    pub fn is_pulled(
        &self,
        source_id: &str,
        source_path: &str,
        size: u64,
        mtime: i64,
    ) -> Result<bool, StoreError> {
        let pulled = self.conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM files
                 WHERE source_id = ?1 AND source_path = ?2 AND size = ?3 AND mtime = ?4
             )",
            params![source_id, source_path, size as i64, mtime],
            |row| row.get(0),
        )?;
        Ok(pulled)
    }

    /// Insert or refresh the record for a pulled file and return its id.
    ///
    /// Pass an empty `local_path` when no local copy is guaranteed to survive.
    pub fn record_pull(
        &self,
        source_id: &str,
        source_path: &str,
        local_path: &str,
        size: u64,
        mtime: i64,
    ) -> Result<FileId, StoreError> {
        let id = self.conn.query_row(
            "INSERT INTO files (source_id, source_path, local_path, size, mtime, pulled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source_id, source_path) DO UPDATE SET
                 local_path = excluded.local_path,
                 size = excluded.size,
                 mtime = excluded.mtime,
                 pulled_at = excluded.pulled_at
             RETURNING id",
            params![source_id, source_path, local_path, size as i64, mtime, Utc::now()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Id of the record for `(source_id, source_path)`, if one exists.
    pub fn file_id(&self, source_id: &str, source_path: &str) -> Result<Option<FileId>, StoreError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM files WHERE source_id = ?1 AND source_path = ?2",
                params![source_id, source_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Replace the staging path of a record. An empty path clears the claim
    /// that a local copy exists.
    pub fn set_local_path(&self, file_id: FileId, local_path: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE files SET local_path = ?1 WHERE id = ?2",
            params![local_path, file_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownFile(file_id));
        }
        Ok(())
    }

    /// Make the next listing of this file look changed, so it is pulled
    /// again. Used when a staged copy was lost before every destination got
    /// it. Upload records are kept.
    pub fn invalidate_pull(&self, file_id: FileId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE files SET mtime = ?1, local_path = '' WHERE id = ?2",
            params![STALE_MTIME, file_id],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownFile(file_id));
        }
        Ok(())
    }

    // ===== Push side =====

    /// Record a successful upload. Repeating it only refreshes the timestamp.
    pub fn record_destination_sync(&self, file_id: FileId, destination: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO dest_syncs (file_id, destination, synced_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(file_id, destination) DO UPDATE SET synced_at = excluded.synced_at",
            params![file_id, destination, Utc::now()],
        )?;
        Ok(())
    }

    /// Pulled files with no recorded upload to `destination`, oldest first.
    pub fn unpushed_files(&self, destination: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.query_records(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files f
                 WHERE f.pulled_at IS NOT NULL
                   AND NOT EXISTS (
                       SELECT 1 FROM dest_syncs ds
                       WHERE ds.file_id = f.id AND ds.destination = ?1
                   )
                 ORDER BY f.id"
            ),
            params![destination],
        )
    }

    /// Every recorded upload of one file, by destination name.
    pub fn destination_syncs(&self, file_id: FileId) -> Result<Vec<DestinationSyncRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT file_id, destination, synced_at FROM dest_syncs
             WHERE file_id = ?1 ORDER BY destination",
        )?;
        let syncs = stmt
            .query_map(params![file_id], |row| {
                Ok(DestinationSyncRecord {
                    file_id: row.get(0)?,
                    destination: row.get(1)?,
                    synced_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(syncs)
    }

    /// Names of the destinations a file has been uploaded to.
    pub fn synced_destinations(&self, file_id: FileId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .destination_syncs(file_id)?
            .into_iter()
            .map(|sync| sync.destination)
            .collect())
    }

    // ===== Eligibility =====

    /// Whether one file has been uploaded to at least as many distinct
    /// destinations as `destinations` names. Unknown files and an empty
    /// destination set are never fully synced.
    pub fn is_fully_synced<S: AsRef<str>>(
        &self,
        source_id: &str,
        source_path: &str,
        destinations: &[S],
    ) -> Result<bool, StoreError> {
        if destinations.is_empty() {
            return Ok(false);
        }
        let Some(file_id) = self.file_id(source_id, source_path)? else {
            return Ok(false);
        };
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT destination) FROM dest_syncs WHERE file_id = ?1",
            params![file_id],
            |row| row.get(0),
        )?;
        Ok(count >= destinations.len() as i64)
    }

    /// Files of `source_id` uploaded to every destination in `destinations`
    /// (by distinct-destination count). Empty when no destination is given.
    pub fn fully_synced<S: AsRef<str>>(
        &self,
        source_id: &str,
        destinations: &[S],
    ) -> Result<Vec<FileRecord>, StoreError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }
        self.query_records(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files f
                 WHERE f.source_id = ?1
                   AND (SELECT COUNT(DISTINCT ds.destination)
                        FROM dest_syncs ds WHERE ds.file_id = f.id) >= ?2
                 ORDER BY f.id"
            ),
            params![source_id, destinations.len() as i64],
        )
    }

    /// Files of `source_id` uploaded to at least one destination.
    pub fn any_synced(&self, source_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.query_records(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files f
                 WHERE f.source_id = ?1
                   AND EXISTS (SELECT 1 FROM dest_syncs ds WHERE ds.file_id = f.id)
                 ORDER BY f.id"
            ),
            params![source_id],
        )
    }

    // ===== Reporting =====

    /// All records of one source.
    pub fn records(&self, source_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        self.query_records(
            &format!("SELECT {FILE_COLUMNS} FROM files f WHERE f.source_id = ?1 ORDER BY f.id"),
            params![source_id],
        )
    }

    /// Every source id with at least one record.
    pub fn sources(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT source_id FROM files ORDER BY source_id")?;
        let sources = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(sources)
    }

    /// Counters for one source. `fully_synced` stays zero when no
    /// destination is configured.
    pub fn stats(&self, source_id: &str, destination_count: usize) -> Result<SourceStats, StoreError> {
        let (total, pulled): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(pulled_at) FROM files WHERE source_id = ?1",
            params![source_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let fully_synced: i64 = if destination_count > 0 {
            self.conn.query_row(
                "SELECT COUNT(*) FROM files f
                 WHERE f.source_id = ?1
                   AND (SELECT COUNT(DISTINCT ds.destination)
                        FROM dest_syncs ds WHERE ds.file_id = f.id) >= ?2",
                params![source_id, destination_count as i64],
                |row| row.get(0),
            )?
        } else {
            0
        };

        Ok(SourceStats {
            total: total.max(0) as usize,
            pulled: pulled.max(0) as usize,
            fully_synced: fully_synced.max(0) as usize,
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, file_record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn file_record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        source_path: row.get(2)?,
        local_path: row.get(3)?,
        size: row.get::<_, i64>(4)?.max(0) as u64,
        mtime: row.get(5)?,
        pulled_at: row.get::<_, Option<DateTime<Utc>>>(6)?,
    })
}
