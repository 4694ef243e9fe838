//! Read-only views of which pulled files are safe to clean up at the source.
//!
//! Nothing here deletes anything; a cleanup facility consumes the listing.

use serde::Serialize;

use crate::config::Config;
use crate::state::{FileRecord, StateStore, StoreError};

/// Which files count as eligible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum EligibilityMode {
    /// Uploaded to every configured destination.
    #[default]
    FullySynced,
    /// Uploaded to at least one destination.
    AnySynced,
}

/// Eligible records of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibleFiles {
    pub source_id: String,
    pub mode: EligibilityMode,
    pub files: Vec<FileRecord>,
}

impl EligibleFiles {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// List eligible files of `source_id` against the configured destinations.
pub fn eligible_files(
    store: &StateStore,
    config: &Config,
    source_id: &str,
    mode: EligibilityMode,
) -> Result<EligibleFiles, StoreError> {
    let files = match mode {
        EligibilityMode::FullySynced => {
            store.fully_synced(source_id, config.destination_names().as_slice())?
        }
        EligibilityMode::AnySynced => store.any_synced(source_id)?,
    };
    Ok(EligibleFiles {
        source_id: source_id.to_string(),
        mode,
        files,
    })
}

/// [`eligible_files`] for every source the store knows about.
pub fn eligible_for_all(
    store: &StateStore,
    config: &Config,
    mode: EligibilityMode,
) -> Result<Vec<EligibleFiles>, StoreError> {
    store
        .sources()?
        .iter()
        .map(|source_id| eligible_files(store, config, source_id, mode))
        .collect()
}
