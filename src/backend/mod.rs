//! Transport seams: where bytes come from and where they go.
//!
//! The sync loops only see the two traits below. Concrete transports drive
//! `adb` and `rclone`, or plain directories for mounted media and NAS shares.

pub mod adb;
mod command;
pub mod error;
pub mod local;
pub mod rclone;

use chrono::{DateTime, Utc};
use std::path::Path;

pub use adb::AdbDevice;
pub use error::BackendError;
pub use local::{DirectoryRemote, MountedDevice};
pub use rclone::RcloneRemote;

/// A file as listed by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path on the source, `/`-separated.
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, size: u64, mtime: i64) -> Self {
        Self {
            path: path.into(),
            size,
            modified: DateTime::from_timestamp(mtime, 0).unwrap_or_default(),
        }
    }

    /// Modification time in Unix seconds, the unit the state store keys on.
    pub fn mtime(&self) -> i64 {
        self.modified.timestamp()
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// How a source is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Usb,
    Wifi,
    Mount,
}

impl ConnectionType {
    pub fn short_name(&self) -> &'static str {
        match self {
            ConnectionType::Usb => "usb",
            ConnectionType::Wifi => "wifi",
            ConnectionType::Mount => "mount",
        }
    }
}

/// A source the device backend can currently see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedSource {
    /// Stable opaque identifier used as the state store key.
    pub id: String,
    /// Transport state, e.g. `device`, `offline`, `unauthorized`.
    pub state: String,
    pub connection: ConnectionType,
    pub model: Option<String>,
    pub product: Option<String>,
    pub transport_id: Option<String>,
}

impl ConnectedSource {
    /// Ready for listing and copying.
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Enumerates and copies files from a source filesystem.
pub trait DeviceBackend {
    /// Sources currently attached, online or not.
    fn connected_sources(&self) -> Result<Vec<ConnectedSource>, BackendError>;

    /// Files under `path`. A path that does not exist yields an empty list.
    fn list_files(
        &self,
        source_id: &str,
        path: &str,
        recursive: bool,
    ) -> Result<Vec<SourceFile>, BackendError>;

    /// Copy one file from the source to `local_path`.
    fn copy_to_local(
        &self,
        source_id: &str,
        source_path: &str,
        local_path: &Path,
    ) -> Result<(), BackendError>;
}

/// Uploads to and downloads from remote destinations.
pub trait RemoteBackend {
    /// Whether the destination root answers at all.
    fn is_reachable(&self, remote: &str) -> bool;

    /// Upload a local file to a full remote path.
    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), BackendError>;

    /// Download a remote file to a local path.
    fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), BackendError>;
}

/// Routes absolute-path destinations to [`DirectoryRemote`] and everything
/// else (`name:path` remotes) to [`RcloneRemote`].
#[derive(Debug, Default)]
pub struct DispatchRemote {
    rclone: RcloneRemote,
    directory: DirectoryRemote,
}

impl DispatchRemote {
    pub fn new(rclone: RcloneRemote) -> Self {
        Self {
            rclone,
            directory: DirectoryRemote,
        }
    }

    fn backend_for(&self, remote: &str) -> &dyn RemoteBackend {
        if Path::new(remote).is_absolute() {
            &self.directory
        } else {
            &self.rclone
        }
    }
}

impl RemoteBackend for DispatchRemote {
    fn is_reachable(&self, remote: &str) -> bool {
        self.backend_for(remote).is_reachable(remote)
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), BackendError> {
        self.backend_for(remote_path).upload(local_path, remote_path)
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), BackendError> {
        self.backend_for(remote_path).download(remote_path, local_path)
    }
}
