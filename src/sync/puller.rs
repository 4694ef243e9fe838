//! Pull phase: copy new or changed files from a source into local staging.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use tracing::{debug, info};

use crate::backend::DeviceBackend;
use crate::config::Config;
use crate::state::StateStore;
use crate::sync::exclude::ExcludePatterns;
use crate::sync::layout::{preserve_mtime, staging_path};

/// Outcome of pulling one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullResult {
    pub source_id: String,
    pub pulled: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl PullResult {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }
}

/// Copies files that the state store has not seen (or has seen with a
/// different size or modification time) into the staging root.
pub struct Puller<'a> {
    device: &'a dyn DeviceBackend,
    store: &'a StateStore,
    config: &'a Config,
    excludes: ExcludePatterns,
}

impl<'a> Puller<'a> {
    pub fn new(device: &'a dyn DeviceBackend, store: &'a StateStore, config: &'a Config) -> Self {
        Self {
            device,
            store,
            config,
            excludes: ExcludePatterns::with_extra(config.exclude.as_slice()),
        }
    }

    /// Pull every online source the device backend can see.
    pub fn pull_all(&self) -> Result<Vec<PullResult>> {
        let sources = self
            .device
            .connected_sources()
            .context("Failed to enumerate sources")?;

        Ok(sources
            .iter()
            .filter(|source| source.is_online())
            .map(|source| self.pull_source(&source.id))
            .collect())
    }

    /// Pull one source. Never fails as a whole: every problem is recorded in
    /// the result and the next file is tried.
    pub fn pull_source(&self, source_id: &str) -> PullResult {
        let mut result = PullResult::new(source_id);
        let sync_root = self.config.expand_sync_dir();

        for media in &self.config.media_paths {
            let files = match self.device.list_files(source_id, &media.path, true) {
                Ok(files) => files,
                Err(e) => {
                    result.errors.push(format!("list {}: {e}", media.path));
                    continue;
                }
            };

            for file in files {
                if self.excludes.is_excluded(&file.path) {
                    debug!(path = %file.path, "excluded");
                    continue;
                }

                match self.store.is_pulled(source_id, &file.path, file.size, file.mtime()) {
                    Ok(true) => {
                        result.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        result.errors.push(format!("check {}: {e}", file.path));
                        continue;
                    }
                }

                let local_path = staging_path(&sync_root, media.category(), &file.path);
                if let Some(dir) = local_path.parent() {
                    if let Err(e) = fs::create_dir_all(dir) {
                        result.errors.push(format!("mkdir {}: {e}", dir.display()));
                        continue;
                    }
                }

                info!(source = source_id, from = %file.path, to = %local_path.display(), "pulling");
                if let Err(e) = self.device.copy_to_local(source_id, &file.path, &local_path) {
                    result.errors.push(format!("pull {}: {e}", file.path));
                    continue;
                }

                // Best effort: a wrong local mtime does not make the copy invalid.
                if let Err(e) = preserve_mtime(&local_path, file.mtime()) {
                    result.errors.push(format!("chtimes {}: {e}", local_path.display()));
                }

                let recorded = self.store.record_pull(
                    source_id,
                    &file.path,
                    &local_path.to_string_lossy(),
                    file.size,
                    file.mtime(),
                );
                if let Err(e) = recorded {
                    result.errors.push(format!("record {}: {e}", file.path));
                    continue;
                }
                result.pulled += 1;
            }
        }

        result
    }
}
