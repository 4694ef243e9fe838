// Shared fakes for the integration tests
// In-memory device and remote backends that record every call

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use fetchsync::backend::{
    BackendError, ConnectedSource, ConnectionType, DeviceBackend, RemoteBackend, SourceFile,
};
use fetchsync::config::{Config, Destination, MediaPath};

pub const SOURCE: &str = "1WMHH815X";

/// A single online source whose files are `(size, mtime)` entries.
pub struct FakeDevice {
    pub source_id: String,
    files: RefCell<BTreeMap<String, (u64, i64)>>,
    failing_copies: RefCell<BTreeSet<String>>,
    pub copies: RefCell<Vec<String>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            source_id: SOURCE.to_string(),
            files: RefCell::new(BTreeMap::new()),
            failing_copies: RefCell::new(BTreeSet::new()),
            copies: RefCell::new(Vec::new()),
        }
    }

    pub fn add_file(&self, path: &str, size: u64, mtime: i64) {
        self.files.borrow_mut().insert(path.to_string(), (size, mtime));
    }

    pub fn fail_copy(&self, path: &str) {
        self.failing_copies.borrow_mut().insert(path.to_string());
    }

    pub fn copy_count(&self) -> usize {
        self.copies.borrow().len()
    }
}

impl DeviceBackend for FakeDevice {
    fn connected_sources(&self) -> Result<Vec<ConnectedSource>, BackendError> {
        Ok(vec![ConnectedSource {
            id: self.source_id.clone(),
            state: "device".to_string(),
            connection: ConnectionType::Usb,
            model: Some("Quest_3".to_string()),
            product: None,
            transport_id: None,
        }])
    }

    fn list_files(
        &self,
        source_id: &str,
        path: &str,
        _recursive: bool,
    ) -> Result<Vec<SourceFile>, BackendError> {
        if source_id != self.source_id {
            return Err(BackendError::Unavailable(format!("no source {source_id}")));
        }
        Ok(self
            .files
            .borrow()
            .iter()
            .filter(|(file, _)| file.starts_with(path))
            .map(|(file, (size, mtime))| SourceFile::new(file.clone(), *size, *mtime))
            .collect())
    }

    fn copy_to_local(
        &self,
        _source_id: &str,
        source_path: &str,
        local_path: &Path,
    ) -> Result<(), BackendError> {
        if self.failing_copies.borrow().contains(source_path) {
            return Err(BackendError::Unavailable(format!("copy of {source_path} failed")));
        }
        let size = self
            .files
            .borrow()
            .get(source_path)
            .map(|(size, _)| *size)
            .ok_or_else(|| BackendError::Unavailable(format!("{source_path} vanished")))?;
        fs::write(local_path, vec![b'x'; size as usize])
            .map_err(|e| BackendError::io(e, "writing", local_path))?;
        self.copies.borrow_mut().push(source_path.to_string());
        Ok(())
    }
}

/// Remotes are addressed by prefix, e.g. `d1:`. Uploads require the local
/// file to exist at call time.
#[derive(Default)]
pub struct FakeRemote {
    unreachable: RefCell<BTreeSet<String>>,
    failing: RefCell<BTreeSet<String>>,
    pub uploads: RefCell<Vec<(PathBuf, String)>>,
    pub reachability_checks: RefCell<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, remote: &str) {
        self.unreachable.borrow_mut().insert(remote.to_string());
    }

    /// Reachable, but every upload fails.
    pub fn set_failing(&self, remote: &str) {
        self.failing.borrow_mut().insert(remote.to_string());
    }

    pub fn heal(&self) {
        self.unreachable.borrow_mut().clear();
        self.failing.borrow_mut().clear();
    }

    /// Successful uploads whose remote path starts with `remote`.
    pub fn uploads_to(&self, remote: &str) -> Vec<String> {
        self.uploads
            .borrow()
            .iter()
            .filter(|(_, to)| to.starts_with(remote))
            .map(|(_, to)| to.clone())
            .collect()
    }

    fn matches(set: &RefCell<BTreeSet<String>>, path: &str) -> bool {
        set.borrow().iter().any(|remote| path.starts_with(remote.as_str()))
    }
}

impl RemoteBackend for FakeRemote {
    fn is_reachable(&self, remote: &str) -> bool {
        self.reachability_checks.borrow_mut().push(remote.to_string());
        !Self::matches(&self.unreachable, remote)
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), BackendError> {
        if Self::matches(&self.unreachable, remote_path) {
            panic!("upload attempted against unreachable remote: {remote_path}");
        }
        if Self::matches(&self.failing, remote_path) {
            return Err(BackendError::Unavailable(format!("upload to {remote_path} failed")));
        }
        if !local_path.is_file() {
            return Err(BackendError::Unavailable(format!(
                "{} does not exist",
                local_path.display()
            )));
        }
        self.uploads
            .borrow_mut()
            .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
    }

    fn download(&self, remote_path: &str, _local_path: &Path) -> Result<(), BackendError> {
        Err(BackendError::Unavailable(format!("no download of {remote_path}")))
    }
}

/// A config staging into `sync_dir` with one screenshot path and the given
/// `(name, remote)` destinations.
pub fn test_config(sync_dir: &Path, destinations: &[(&str, &str)]) -> Config {
    Config {
        sync_dir: sync_dir.to_string_lossy().into_owned(),
        media_paths: vec![MediaPath::new("/sdcard/Oculus/Screenshots/")],
        destinations: destinations
            .iter()
            .map(|(name, remote)| Destination::new(*name, *remote))
            .collect(),
        ..Config::default()
    }
}

pub const SHOTS: &str = "/sdcard/Oculus/Screenshots/";

pub fn shot(name: &str) -> String {
    format!("{SHOTS}{name}")
}
