//! Push phase: upload staged files each destination has not confirmed yet.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::backend::RemoteBackend;
use crate::config::{Config, Destination};
use crate::state::{FileId, StateStore};
use crate::sync::layout::remote_relative_path;

/// Error recorded when a destination fails its reachability check.
pub const UNREACHABLE: &str = "destination unreachable";

/// Outcome of pushing to one destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushResult {
    pub destination: String,
    pub pushed: usize,
    /// Records without a local copy, never attempted.
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl PushResult {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Pusher<'a> {
    remote: &'a dyn RemoteBackend,
    store: &'a StateStore,
    config: &'a Config,
}

impl<'a> Pusher<'a> {
    pub fn new(remote: &'a dyn RemoteBackend, store: &'a StateStore, config: &'a Config) -> Self {
        Self {
            remote,
            store,
            config,
        }
    }

    /// One result per configured destination. A failing destination never
    /// affects the others.
    pub fn push_all(&self) -> Vec<PushResult> {
        self.config
            .destinations
            .iter()
            .map(|dest| self.push_destination(dest))
            .collect()
    }

    /// Check reachability, then upload everything `dest` is missing.
    pub fn push_destination(&self, dest: &Destination) -> PushResult {
        if !self.remote.is_reachable(&dest.remote) {
            warn!(destination = %dest.name, "unreachable, skipping");
            let mut result = PushResult::new(&dest.name);
            result.errors.push(UNREACHABLE.to_string());
            return result;
        }
        info!(destination = %dest.name, "reachable");
        self.push_reachable(dest)
    }

    /// Upload everything `dest` is missing, without a reachability check.
    pub fn push_reachable(&self, dest: &Destination) -> PushResult {
        let mut result = PushResult::new(&dest.name);

        let records = match self.store.unpushed_files(&dest.name) {
            Ok(records) => records,
            Err(e) => {
                result.errors.push(format!("list unpushed: {e}"));
                return result;
            }
        };

        let sync_root = self.config.expand_sync_dir();
        for record in records {
            let Some(local_path) = record.local_copy() else {
                result.skipped += 1;
                continue;
            };

            match self.upload_one(record.id, local_path, &sync_root, dest) {
                Ok(()) => result.pushed += 1,
                Err(e) => result.errors.push(e),
            }
        }

        result
    }

    /// Upload a single staged file to each of `destinations` and record every
    /// success. `base_dir` is the staging root the file was placed under.
    pub fn push_file(
        &self,
        file_id: FileId,
        local_path: &Path,
        base_dir: &Path,
        destinations: &[&Destination],
    ) -> Vec<PushResult> {
        destinations
            .iter()
            .map(|dest| {
                let mut result = PushResult::new(&dest.name);
                match self.upload_one(file_id, local_path, base_dir, dest) {
                    Ok(()) => result.pushed = 1,
                    Err(e) => result.errors.push(e),
                }
                result
            })
            .collect()
    }

    fn upload_one(
        &self,
        file_id: FileId,
        local_path: &Path,
        base_dir: &Path,
        dest: &Destination,
    ) -> Result<(), String> {
        let remote_path = dest.remote_path(&remote_relative_path(base_dir, local_path));

        info!(from = %local_path.display(), to = %remote_path, "uploading");
        self.remote
            .upload(local_path, &remote_path)
            .map_err(|e| format!("push {}: {e}", local_path.display()))?;

        self.store
            .record_destination_sync(file_id, &dest.name)
            .map_err(|e| format!("record sync {}: {e}", local_path.display()))
    }
}
