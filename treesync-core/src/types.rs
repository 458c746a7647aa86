//! Domain types shared by the treesync crates.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::PathBuf;

/// Which side of the synchronization a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Source,
    Replica,
}

impl RootKind {
    /// Lowercase name, used in manifest keys and mid-sentence messages.
    pub fn as_str(self) -> &'static str {
        match self {
            RootKind::Source => "source",
            RootKind::Replica => "replica",
        }
    }

    pub fn other(self) -> Self {
        match self {
            RootKind::Source => RootKind::Replica,
            RootKind::Replica => RootKind::Source,
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKind::Source => f.write_str("Source"),
            RootKind::Replica => f.write_str("Replica"),
        }
    }
}

/// A path discovered in one tree together with its counterpart in the other.
///
/// Built by stripping the walk root and joining the remainder onto the other
/// root, so `relative` is identical on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPair {
    pub source: PathBuf,
    pub replica: PathBuf,
    /// Path relative to either root; empty for the roots themselves.
    pub relative: PathBuf,
}

impl PathPair {
    /// Relative path with `/` separators on every platform.
    pub fn relative_key(&self) -> String {
        self.relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
