//! Plain-directory transports: a mounted removable medium as a source, and a
//! local or network-mounted directory as a destination.

use jwalk::{Parallelism, WalkDir};
use std::fs;
use std::path::{Path, PathBuf};

use super::{BackendError, ConnectedSource, ConnectionType, DeviceBackend, RemoteBackend, SourceFile};

/// A source that is a directory tree on this machine (SD card, camera
/// mount, USB stick). Source paths are `/`-rooted at `root`.
#[derive(Debug, Clone)]
pub struct MountedDevice {
    source_id: String,
    root: PathBuf,
}

impl MountedDevice {
    pub fn new(source_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            root: root.into(),
        }
    }

    fn full_path(&self, source_id: &str, path: &str) -> Result<PathBuf, BackendError> {
        if source_id != self.source_id {
            return Err(BackendError::Unavailable(format!(
                "source {source_id} is not mounted (this mount is {})",
                self.source_id
            )));
        }
        Ok(self.root.join(path.trim_start_matches('/')))
    }

    /// Source-side path of a file below the mount root.
    fn source_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }
}

impl DeviceBackend for MountedDevice {
    fn connected_sources(&self) -> Result<Vec<ConnectedSource>, BackendError> {
        let state = if self.root.is_dir() { "device" } else { "offline" };
        Ok(vec![ConnectedSource {
            id: self.source_id.clone(),
            state: state.to_string(),
            connection: ConnectionType::Mount,
            model: None,
            product: None,
            transport_id: None,
        }])
    }

    fn list_files(
        &self,
        source_id: &str,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<SourceFile>, BackendError> {
        let dir = self.full_path(source_id, path)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(&dir)
            .skip_hidden(false)
            .sort(true)
            .parallelism(Parallelism::Serial)
            .max_depth(if recursive { usize::MAX } else { 1 });

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                BackendError::Unavailable(format!("walking {}: {e}", dir.display()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let full = entry.path();
            let metadata = fs::metadata(&full)
                .map_err(|e| BackendError::io(e, "reading metadata of", &full))?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            if let Some(source_path) = self.source_path(&full) {
                files.push(SourceFile::new(source_path, metadata.len(), mtime));
            }
        }

        Ok(files)
    }

    fn copy_to_local(
        &self,
        source_id: &str,
        source_path: &str,
        local_path: &Path,
    ) -> Result<(), BackendError> {
        let from = self.full_path(source_id, source_path)?;
        copy_file(&from, local_path)
    }
}

/// A destination that is a directory: a NAS share, an external disk.
/// The remote string is the absolute directory path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryRemote;

impl RemoteBackend for DirectoryRemote {
    fn is_reachable(&self, remote: &str) -> bool {
        Path::new(remote).is_dir()
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), BackendError> {
        copy_file(local_path, Path::new(remote_path))
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), BackendError> {
        copy_file(Path::new(remote_path), local_path)
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), BackendError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| BackendError::io(e, "creating directory", parent))?;
    }
    fs::copy(from, to).map_err(|e| BackendError::io(e, "copying", from))?;
    Ok(())
}
