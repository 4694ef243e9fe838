//! Error type for the sync state store.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a state store operation.
///
/// Fatal to the step that raised it (one file or one destination), never to
/// the whole run: callers render it into their error list and move on.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store file could not be opened or initialised.
    #[error("failed to open state store {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Any query or write failure reported by SQLite.
    #[error("state store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure around the store file (creating its directory).
    #[error("I/O error while {operation} {}: {source}", path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file id that no record carries.
    #[error("no file record with id {0}")]
    UnknownFile(i64),
}

impl StoreError {
    /// Wrap an I/O error with the operation and path it happened on.
    pub fn io(source: io::Error, operation: &str, path: impl Into<PathBuf>) -> Self {
        StoreError::Io {
            operation: operation.to_string(),
            path: path.into(),
            source,
        }
    }
}
