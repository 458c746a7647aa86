//! Error types for treesync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::RootKind;

/// Problems found while validating the source and replica roots.
///
/// [`SyncRoots::resolve`](crate::SyncRoots::resolve) collects every issue it
/// finds so callers can report each one individually.
#[derive(Debug, Error)]
pub enum RootsError {
    /// The root path does not exist.
    #[error("{kind} folder does not exist: {}", .path.display())]
    Missing { kind: RootKind, path: PathBuf },

    /// The root path exists but is not a directory.
    #[error("{kind} folder is not a directory: {}", .path.display())]
    NotADirectory { kind: RootKind, path: PathBuf },

    /// Source and replica resolve to the same directory.
    #[error("source and replica folders are the same directory: {}", .path.display())]
    SameDirectory { path: PathBuf },

    /// One root lives inside the other.
    #[error("{inner} folder {} is nested inside the {} folder", .path.display(), .inner.other().as_str())]
    Nested { inner: RootKind, path: PathBuf },

    /// An auxiliary path (e.g. the manifest) lies inside one of the trees.
    #[error("{} lies inside the {} folder", .path.display(), .kind.as_str())]
    InsideRoot { kind: RootKind, path: PathBuf },

    /// Underlying I/O failure while inspecting a root.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
