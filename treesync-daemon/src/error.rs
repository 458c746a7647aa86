use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the scheduling loop and logging setup.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync error: {0}")]
    Sync(#[from] treesync_sync::SyncError),

    #[error("pass task join error: {0}")]
    Join(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
