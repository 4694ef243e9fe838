use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Stable identifier of a file record.
pub type FileId = i64;

/// What the store knows about one file of one source.
///
/// Keyed by `(source_id, source_path)`. `local_path` is empty when no local
/// copy is guaranteed to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: FileId,
    pub source_id: String,
    pub source_path: String,
    pub local_path: String,
    pub size: u64,
    /// Source modification time, Unix seconds.
    pub mtime: i64,
    pub pulled_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Whether the record claims a staged copy on local disk.
    pub fn has_local_copy(&self) -> bool {
        !self.local_path.is_empty()
    }

    /// The staged copy, if the record claims one.
    pub fn local_copy(&self) -> Option<&Path> {
        if self.has_local_copy() {
            Some(Path::new(&self.local_path))
        } else {
            None
        }
    }

    /// File name as reported by the source.
    pub fn file_name(&self) -> &str {
        self.source_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.source_path)
    }
}

/// A confirmed upload of a file to one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSyncRecord {
    pub file_id: FileId,
    pub destination: String,
    pub synced_at: DateTime<Utc>,
}

/// Per-source counters for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub total: usize,
    pub pulled: usize,
    /// Synced to at least as many distinct destinations as configured.
    pub fully_synced: usize,
}
