use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a device or remote transport call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The external program could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The external program ran and reported failure.
    #[error("{program} {args} failed ({status}): {output}")]
    Command {
        program: String,
        args: String,
        status: String,
        output: String,
    },

    /// Local filesystem failure while moving bytes.
    #[error("I/O error while {operation} {}: {source}", path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The transport refused the request for a reason of its own.
    #[error("{0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn io(source: io::Error, operation: &str, path: impl Into<PathBuf>) -> Self {
        BackendError::Io {
            operation: operation.to_string(),
            path: path.into(),
            source,
        }
    }
}
