// Tests for streaming mode
// Per-file pull/push with retention on partial failure

mod common;

use common::{shot, test_config, FakeDevice, FakeRemote, SOURCE};
use fetchsync::backend::{BackendError, RemoteBackend};
use fetchsync::state::StateStore;
use fetchsync::sync::streamer::NO_REACHABLE_DESTINATIONS;
use fetchsync::sync::{StreamOptions, Streamer};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const TWO_DESTINATIONS: &[(&str, &str)] = &[("d1", "d1:"), ("d2", "d2:")];

/// Remote that notes which staging paths the store claims while each upload
/// is in flight.
struct RecordCheckingRemote<'s> {
    store: &'s StateStore,
    claimed: RefCell<Vec<String>>,
}

impl<'s> RecordCheckingRemote<'s> {
    fn new(store: &'s StateStore) -> Self {
        Self {
            store,
            claimed: RefCell::new(Vec::new()),
        }
    }
}

impl RemoteBackend for RecordCheckingRemote<'_> {
    fn is_reachable(&self, _remote: &str) -> bool {
        true
    }

    fn upload(&self, local_path: &Path, _remote_path: &str) -> Result<(), BackendError> {
        assert!(local_path.is_file(), "staged copy missing during upload");
        let records = self.store.records(SOURCE).unwrap();
        self.claimed
            .borrow_mut()
            .extend(records.into_iter().map(|r| r.local_path));
        Ok(())
    }

    fn download(&self, remote_path: &str, _local_path: &Path) -> Result<(), BackendError> {
        Err(BackendError::Unavailable(format!("no download of {remote_path}")))
    }
}

#[test]
fn test_partial_failure_retains_then_resumes_only_failed_destination() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    device.add_file(&shot("a.jpg"), 100, 10);
    remote.set_failing("d2:");

    let streamer = Streamer::new(&device, &remote, &store, &config, StreamOptions::skip_local());

    let first = streamer.stream_source(SOURCE);
    assert_eq!(first.streamed, 1);
    assert_eq!(first.retained, 1);
    assert_eq!(first.deleted, 0);
    assert_eq!(first.errors.len(), 1, "{:?}", first.errors);

    // Moved out of the temporary directory into the sync root.
    let kept = dir.path().join("Screenshots/a.jpg");
    assert!(kept.is_file());
    let record = &store.records(SOURCE).unwrap()[0];
    assert_eq!(record.local_copy(), Some(kept.as_path()));
    assert_eq!(remote.uploads_to("d1:").len(), 1);

    remote.heal();
    let second = streamer.stream_source(SOURCE);

    assert_eq!(second.streamed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.resumed, 1);
    assert_eq!(second.deleted, 1);
    assert!(second.errors.is_empty(), "{:?}", second.errors);

    // d1 already had it; only d2 got a new upload. Nothing was pulled again.
    assert_eq!(remote.uploads_to("d1:").len(), 1);
    assert_eq!(remote.uploads_to("d2:"), vec!["d2:Screenshots/a.jpg".to_string()]);
    assert_eq!(device.copy_count(), 1);

    assert!(!kept.exists());
    assert!(!store.records(SOURCE).unwrap()[0].has_local_copy());
    assert!(store
        .is_fully_synced(SOURCE, &shot("a.jpg"), &["d1", "d2"])
        .unwrap());
}

#[test]
fn test_skip_local_success_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    device.add_file(&shot("a.jpg"), 100, 10);
    device.add_file(&shot("b.jpg"), 200, 20);

    let streamer = Streamer::new(&device, &remote, &store, &config, StreamOptions::skip_local());
    let result = streamer.stream_source(SOURCE);

    assert_eq!(result.streamed, 2);
    assert_eq!(result.deleted, 2);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert!(!dir.path().join("Screenshots").exists());

    for record in store.records(SOURCE).unwrap() {
        assert!(!record.has_local_copy());
    }
    assert_eq!(remote.uploads.borrow().len(), 4);

    let again = streamer.stream_source(SOURCE);
    assert_eq!(again.skipped, 2);
    assert_eq!(again.streamed, 0);
    assert_eq!(remote.uploads.borrow().len(), 4);
}

#[test]
fn test_default_mode_keeps_local_copies() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    device.add_file(&shot("a.jpg"), 100, 10);

    let result = Streamer::new(&device, &remote, &store, &config, StreamOptions::default())
        .stream_source(SOURCE);

    assert_eq!(result.streamed, 1);
    assert_eq!(result.retained, 1);
    let kept = dir.path().join("Screenshots/a.jpg");
    assert!(kept.is_file());
    assert_eq!(
        store.records(SOURCE).unwrap()[0].local_copy(),
        Some(kept.as_path())
    );
}

#[test]
fn test_delete_after_push_stages_under_sync_root() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    device.add_file(&shot("a.jpg"), 100, 10);

    let options = StreamOptions {
        skip_local: false,
        delete_after_push: true,
    };
    let result = Streamer::new(&device, &remote, &store, &config, options).stream_source(SOURCE);

    assert_eq!(result.deleted, 1);
    let uploaded_from = remote.uploads.borrow()[0].0.clone();
    assert!(uploaded_from.starts_with(dir.path()));
    assert!(!uploaded_from.exists());
    assert!(!store.records(SOURCE).unwrap()[0].has_local_copy());
}

#[test]
fn test_no_reachable_destination_pulls_nothing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    device.add_file(&shot("a.jpg"), 100, 10);
    remote.set_unreachable("d1:");
    remote.set_unreachable("d2:");

    let result = Streamer::new(&device, &remote, &store, &config, StreamOptions::skip_local())
        .stream_source(SOURCE);

    assert_eq!(result.errors, vec![NO_REACHABLE_DESTINATIONS.to_string()]);
    assert_eq!(device.copy_count(), 0);
    assert!(store.records(SOURCE).unwrap().is_empty());
}

#[test]
fn test_reachability_checked_once_per_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        device.add_file(&shot(name), 10, 1);
    }
    remote.set_unreachable("d2:");

    let result = Streamer::new(&device, &remote, &store, &config, StreamOptions::default())
        .stream_source(SOURCE);

    assert_eq!(result.streamed, 3);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(remote.reachability_checks.borrow().len(), 2);
    assert_eq!(remote.uploads_to("d1:").len(), 3);
    assert!(remote.uploads_to("d2:").is_empty());
}

#[test]
fn test_stream_all_covers_connected_sources() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    device.add_file(&shot("a.jpg"), 100, 10);

    let results = Streamer::new(&device, &remote, &store, &config, StreamOptions::skip_local())
        .stream_all()
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source_id, SOURCE);
    assert_eq!(results[0].deleted, 1);
}

#[test]
fn test_skip_local_never_records_the_temporary_copy() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = RecordCheckingRemote::new(&store);
    device.add_file(&shot("a.jpg"), 100, 10);

    let result = Streamer::new(&device, &remote, &store, &config, StreamOptions::skip_local())
        .stream_source(SOURCE);

    assert_eq!(result.deleted, 1);
    // One look per destination, both while the bytes sat in the temp dir.
    assert_eq!(*remote.claimed.borrow(), vec![String::new(), String::new()]);
}

#[test]
fn test_default_mode_records_the_staged_copy_before_pushing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = RecordCheckingRemote::new(&store);
    device.add_file(&shot("a.jpg"), 100, 10);

    Streamer::new(&device, &remote, &store, &config, StreamOptions::default())
        .stream_source(SOURCE);

    let staged = dir.path().join("Screenshots/a.jpg").to_string_lossy().into_owned();
    assert_eq!(*remote.claimed.borrow(), vec![staged.clone(), staged]);
}

#[test]
fn test_lost_copy_after_partial_failure_is_pulled_again() {
    let dir = TempDir::new().unwrap();
    // A regular file where the sync root should be: retaining the copy fails.
    let blocked_root = dir.path().join("not-a-dir");
    fs::write(&blocked_root, b"").unwrap();
    let blocked = test_config(&blocked_root, TWO_DESTINATIONS);
    let store = StateStore::open_in_memory().unwrap();
    let device = FakeDevice::new();
    let remote = FakeRemote::new();
    device.add_file(&shot("a.jpg"), 100, 10);
    remote.set_failing("d2:");

    let first = Streamer::new(&device, &remote, &store, &blocked, StreamOptions::skip_local())
        .stream_source(SOURCE);

    assert_eq!(first.retained, 1);
    assert!(first.errors.iter().any(|e| e.starts_with("retain ")), "{:?}", first.errors);
    assert!(!store.is_pulled(SOURCE, &shot("a.jpg"), 100, 10).unwrap());
    assert!(!store.records(SOURCE).unwrap()[0].has_local_copy());

    remote.heal();
    let config = test_config(&dir.path().join("sync"), TWO_DESTINATIONS);
    let second = Streamer::new(&device, &remote, &store, &config, StreamOptions::skip_local())
        .stream_source(SOURCE);

    assert_eq!(second.streamed, 1);
    assert_eq!(second.deleted, 1);
    assert!(second.errors.is_empty(), "{:?}", second.errors);
    assert_eq!(device.copy_count(), 2);
    assert_eq!(remote.uploads_to("d2:"), vec!["d2:Screenshots/a.jpg".to_string()]);
    assert!(store.is_pulled(SOURCE, &shot("a.jpg"), 100, 10).unwrap());
}
