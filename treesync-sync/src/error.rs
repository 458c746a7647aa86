//! Error types for treesync-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise during a synchronization pass.
///
/// None of these are recovered inside a pass: the first one aborts it.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed (unreadable directory, entry vanished, loop).
    #[error("failed to walk {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A walked path did not live under the root it was discovered from.
    #[error("{} is not under {}", .path.display(), .root.display())]
    Rebase { path: PathBuf, root: PathBuf },

    /// Manifest serialization/deserialization error.
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn walk_err(root: impl Into<PathBuf>, source: walkdir::Error) -> SyncError {
    SyncError::Walk {
        root: root.into(),
        source,
    }
}
