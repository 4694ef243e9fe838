//! Streaming mode: pull, push and (optionally) delete one file at a time.
//!
//! Per file the state moves `New -> Pulled -> PushedAll | PushedPartial` and
//! ends `Deleted` or `Retained`. A local copy is only deleted once every
//! attempted upload succeeded; anything less keeps it on disk so the next run
//! re-pushes instead of re-pulling.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

use crate::backend::{DeviceBackend, RemoteBackend, SourceFile};
use crate::config::{Config, Destination, MediaPath};
use crate::state::{FileId, StateStore};
use crate::sync::exclude::ExcludePatterns;
use crate::sync::layout::{move_file, preserve_mtime, staging_path};
use crate::sync::pusher::{PushResult, Pusher};

/// Error recorded when no destination passes the per-run reachability check.
pub const NO_REACHABLE_DESTINATIONS: &str = "no destinations are reachable";

/// How staged copies are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Stage into a run-scoped temporary directory and never record a local
    /// copy as guaranteed.
    pub skip_local: bool,
    /// Stage under the sync root but delete each copy once fully pushed.
    pub delete_after_push: bool,
}

impl StreamOptions {
    pub fn skip_local() -> Self {
        Self {
            skip_local: true,
            delete_after_push: false,
        }
    }

    fn deletes_after_push(&self) -> bool {
        self.skip_local || self.delete_after_push
    }
}

/// Terminal state of a streamed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamOutcome {
    Deleted,
    Retained,
}

/// Outcome of streaming one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamResult {
    pub source_id: String,
    /// Files pulled and pushed in this run.
    pub streamed: usize,
    /// Files already pulled in an earlier run.
    pub skipped: usize,
    /// Local copies removed after a complete push.
    pub deleted: usize,
    /// Local copies kept on disk.
    pub retained: usize,
    /// Uploads of copies retained by an earlier run.
    pub resumed: usize,
    pub errors: Vec<String>,
}

impl StreamResult {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }
}

/// State shared by every file of one source run.
struct SourceRun<'r> {
    source_id: &'r str,
    sync_root: PathBuf,
    staging_root: PathBuf,
    reachable: Vec<&'r Destination>,
    pusher: Pusher<'r>,
}

pub struct Streamer<'a> {
    device: &'a dyn DeviceBackend,
    remote: &'a dyn RemoteBackend,
    store: &'a StateStore,
    config: &'a Config,
    options: StreamOptions,
    excludes: ExcludePatterns,
}

impl<'a> Streamer<'a> {
    pub fn new(
        device: &'a dyn DeviceBackend,
        remote: &'a dyn RemoteBackend,
        store: &'a StateStore,
        config: &'a Config,
        options: StreamOptions,
    ) -> Self {
        Self {
            device,
            remote,
            store,
            config,
            options,
            excludes: ExcludePatterns::with_extra(config.exclude.as_slice()),
        }
    }

    /// Stream every online source the device backend can see.
    pub fn stream_all(&self) -> Result<Vec<StreamResult>> {
        let sources = self
            .device
            .connected_sources()
            .context("Failed to enumerate sources")?;

        Ok(sources
            .iter()
            .filter(|source| source.is_online())
            .map(|source| self.stream_source(&source.id))
            .collect())
    }

    /// Stream one source. Never fails as a whole.
    pub fn stream_source(&self, source_id: &str) -> StreamResult {
        let mut result = StreamResult::new(source_id);

        // Checked once per run; an unreachable destination stays excluded.
        let reachable = self.reachable_destinations();
        if reachable.is_empty() {
            result.errors.push(NO_REACHABLE_DESTINATIONS.to_string());
            return result;
        }

        let temp_dir = if self.options.skip_local {
            match tempfile::Builder::new().prefix("fetchsync-stream-").tempdir() {
                Ok(dir) => Some(dir),
                Err(e) => {
                    result.errors.push(format!("create temp dir: {e}"));
                    return result;
                }
            }
        } else {
            None
        };

        let sync_root = self.config.expand_sync_dir();
        let staging_root = temp_dir
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .unwrap_or_else(|| sync_root.clone());

        let run = SourceRun {
            source_id,
            sync_root,
            staging_root,
            reachable,
            pusher: Pusher::new(self.remote, self.store, self.config),
        };

        self.resume_retained(&run, &mut result);
        self.stream_media(&run, &mut result);

        if let Some(dir) = temp_dir {
            remove_temp_dir(dir, &mut result.errors);
        }
        result
    }

    fn reachable_destinations(&self) -> Vec<&'a Destination> {
        self.config
            .destinations
            .iter()
            .filter(|dest| {
                let reachable = self.remote.is_reachable(&dest.remote);
                if reachable {
                    info!(destination = %dest.name, "reachable");
                } else {
                    warn!(destination = %dest.name, "unreachable, skipping for this run");
                }
                reachable
            })
            .collect()
    }

    fn stream_media(&self, run: &SourceRun<'_>, result: &mut StreamResult) {
        for media in &self.config.media_paths {
            let files = match self.device.list_files(run.source_id, &media.path, true) {
                Ok(files) => files,
                Err(e) => {
                    result.errors.push(format!("list {}: {e}", media.path));
                    continue;
                }
            };

            for file in files {
                if self.excludes.is_excluded(&file.path) {
                    continue;
                }
                match self.store.is_pulled(run.source_id, &file.path, file.size, file.mtime()) {
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

                match self.stream_file(run, media, &file, &mut result.errors) {
                    Some(StreamOutcome::Deleted) => {
                        result.streamed += 1;
                        result.deleted += 1;
                    }
                    Some(StreamOutcome::Retained) => {
                        result.streamed += 1;
                        result.retained += 1;
                    }
                    None => {}
                }
            }
        }
    }

    /// Pull one file, push it to every reachable destination, then delete or
    /// retain the staged copy. `None` when the file never got recorded.
    fn stream_file(
        &self,
        run: &SourceRun<'_>,
        media: &MediaPath,
        file: &SourceFile,
        errors: &mut Vec<String>,
    ) -> Option<StreamOutcome> {
        let local_path = staging_path(&run.staging_root, media.category(), &file.path);
        if let Some(dir) = local_path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                errors.push(format!("mkdir {}: {e}", dir.display()));
                return None;
            }
        }

        info!(source = run.source_id, path = %file.path, "[stream] pulling");
        if let Err(e) = self.device.copy_to_local(run.source_id, &file.path, &local_path) {
            errors.push(format!("pull {}: {e}", file.path));
            return None;
        }
        if let Err(e) = preserve_mtime(&local_path, file.mtime()) {
            errors.push(format!("chtimes {}: {e}", local_path.display()));
        }

        // The temporary copy is gone after this run; never claim it.
        let recorded_path = if self.options.skip_local {
            String::new()
        } else {
            local_path.to_string_lossy().into_owned()
        };
        let file_id = match self.store.record_pull(
            run.source_id,
            &file.path,
            &recorded_path,
            file.size,
            file.mtime(),
        ) {
            Ok(id) => id,
            Err(e) => {
                errors.push(format!("record {}: {e}", file.path));
                return None;
            }
        };

        info!(path = %file.path, destinations = run.reachable.len(), "[stream] pushing");
        let pushes = run
            .pusher
            .push_file(file_id, &local_path, &run.staging_root, &run.reachable);
        let pushed_all = pushes.iter().all(PushResult::is_success);
        errors.extend(pushes.into_iter().flat_map(|p| p.errors));

        if pushed_all && self.options.deletes_after_push() {
            return Some(self.discard_local_copy(file_id, &local_path, errors));
        }

        if !pushed_all && self.options.skip_local {
            // Move out of the temporary directory so the next run can re-push.
            let keep = staging_path(&run.sync_root, media.category(), &file.path);
            match move_file(&local_path, &keep) {
                Ok(()) => {
                    info!(path = %keep.display(), "[stream] retained local copy after failed push");
                    if let Err(e) = self.store.set_local_path(file_id, &keep.to_string_lossy()) {
                        errors.push(format!("record {}: {e}", file.path));
                    }
                }
                Err(e) => {
                    errors.push(format!("retain {}: {e}", local_path.display()));
                    // The copy goes with the temporary directory; pull it again next run.
                    if let Err(e) = self.store.invalidate_pull(file_id) {
                        errors.push(format!("record {}: {e}", file.path));
                    }
                }
            }
        }

        Some(StreamOutcome::Retained)
    }

    /// Re-push copies an earlier run retained, to the reachable destinations
    /// still missing them. Under a delete policy, a copy that is now synced
    /// to every configured destination is removed.
    fn resume_retained(&self, run: &SourceRun<'_>, result: &mut StreamResult) {
        let mut attempted: BTreeMap<FileId, (PathBuf, bool)> = BTreeMap::new();

        for dest in &run.reachable {
            let records = match self.store.unpushed_files(&dest.name) {
                Ok(records) => records,
                Err(e) => {
                    result.errors.push(format!("list unpushed for {}: {e}", dest.name));
                    continue;
                }
            };

            for record in records.iter().filter(|r| r.source_id == run.source_id) {
                let Some(local_path) = record.local_copy() else {
                    continue;
                };

                info!(path = %local_path.display(), destination = %dest.name, "[stream] resuming push");
                let pushes = run
                    .pusher
                    .push_file(record.id, local_path, &run.sync_root, &[*dest]);
                let ok = pushes.iter().all(PushResult::is_success);
                if ok {
                    result.resumed += 1;
                }
                result
                    .errors
                    .extend(pushes.into_iter().flat_map(|p| p.errors));

                let entry = attempted
                    .entry(record.id)
                    .or_insert_with(|| (local_path.to_path_buf(), true));
                entry.1 &= ok;
            }
        }

        if !self.options.deletes_after_push() {
            return;
        }

        let configured = self.config.destination_names();
        for (file_id, (local_path, ok)) in attempted {
            if !ok {
                continue;
            }
            match self.store.synced_destinations(file_id) {
                Ok(synced) => {
                    let complete = configured
                        .iter()
                        .all(|name| synced.iter().any(|s| s.as_str() == *name));
                    if complete
                        && self.discard_local_copy(file_id, &local_path, &mut result.errors)
                            == StreamOutcome::Deleted
                    {
                        result.deleted += 1;
                    }
                }
                Err(e) => result
                    .errors
                    .push(format!("check syncs {}: {e}", local_path.display())),
            }
        }
    }

    /// Delete a staged copy and clear the record's claim to it.
    fn discard_local_copy(
        &self,
        file_id: FileId,
        local_path: &Path,
        errors: &mut Vec<String>,
    ) -> StreamOutcome {
        if let Err(e) = fs::remove_file(local_path) {
            errors.push(format!("delete local {}: {e}", local_path.display()));
            return StreamOutcome::Retained;
        }
        info!(path = %local_path.display(), "[stream] deleted local copy");

        if let Err(e) = self.store.set_local_path(file_id, "") {
            errors.push(format!("record {}: {e}", local_path.display()));
        }
        StreamOutcome::Deleted
    }
}

fn remove_temp_dir(dir: TempDir, errors: &mut Vec<String>) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        errors.push(format!("remove temp dir {}: {e}", path.display()));
    }
}
