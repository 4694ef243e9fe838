//! Sync state: which files were pulled from which source, and which
//! destinations have confirmed each of them.

pub mod error;
pub mod record;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use record::{DestinationSyncRecord, FileId, FileRecord, SourceStats};
pub use store::{StateStore, STORE_FILE_NAME};
