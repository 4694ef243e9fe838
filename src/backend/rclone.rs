//! Destination transport over the `rclone` command-line tool.

use std::path::Path;
use tracing::debug;

use super::command::run_command;
use super::{BackendError, RemoteBackend};

/// Drives `rclone` for uploads, downloads and reachability checks.
#[derive(Debug, Clone)]
pub struct RcloneRemote {
    program: String,
}

impl Default for RcloneRemote {
    fn default() -> Self {
        Self {
            program: "rclone".to_string(),
        }
    }
}

impl RcloneRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `rclone` executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn copyto(&self, from: &str, to: &str) -> Result<(), BackendError> {
        run_command(&self.program, &["copyto", from, to])?.into_result()?;
        Ok(())
    }
}

impl RemoteBackend for RcloneRemote {
    fn is_reachable(&self, remote: &str) -> bool {
        match run_command(&self.program, &["lsf", "--max-depth", "1", remote]) {
            Ok(output) if output.success => true,
            Ok(output) => {
                debug!(remote, output = %output.text.trim(), "remote not reachable");
                false
            }
            Err(e) => {
                debug!(remote, error = %e, "remote not reachable");
                false
            }
        }
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<(), BackendError> {
        self.copyto(&local_path.to_string_lossy(), remote_path)
    }

    fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), BackendError> {
        self.copyto(remote_path, &local_path.to_string_lossy())
    }
}
