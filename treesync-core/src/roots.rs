//! Source/replica root validation and structural path rebasing.
//!
//! A discovered path is translated to the other tree by stripping the root it
//! was found under and joining the remainder onto the other root. Nothing is
//! ever derived by string substitution, so a root name that reappears deeper
//! in a path cannot be rewritten by accident.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::RootsError;
use crate::types::{PathPair, RootKind};

/// Validated pair of synchronization roots.
///
/// Holds the paths as given (used for walking and for log messages) and their
/// canonical forms (used for overlap checks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoots {
    source: PathBuf,
    replica: PathBuf,
    source_canonical: PathBuf,
    replica_canonical: PathBuf,
}

impl SyncRoots {
    /// Validate both roots.
    ///
    /// Each root must exist and be a directory. The two must not resolve to
    /// the same directory and neither may be nested inside the other. Every
    /// problem found is returned, so a missing source and a missing replica
    /// are reported as two separate errors.
    pub fn resolve(
        source: impl Into<PathBuf>,
        replica: impl Into<PathBuf>,
    ) -> Result<Self, Vec<RootsError>> {
        let source = source.into();
        let replica = replica.into();
        let mut issues = Vec::new();

        let source_canonical = inspect_root(RootKind::Source, &source, &mut issues);
        let replica_canonical = inspect_root(RootKind::Replica, &replica, &mut issues);

        let (Some(source_canonical), Some(replica_canonical)) =
            (source_canonical, replica_canonical)
        else {
            return Err(issues);
        };

        if source_canonical == replica_canonical {
            issues.push(RootsError::SameDirectory {
                path: source_canonical.clone(),
            });
        } else if replica_canonical.starts_with(&source_canonical) {
            issues.push(RootsError::Nested {
                inner: RootKind::Replica,
                path: replica.clone(),
            });
        } else if source_canonical.starts_with(&replica_canonical) {
            issues.push(RootsError::Nested {
                inner: RootKind::Source,
                path: source.clone(),
            });
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        Ok(Self {
            source,
            replica,
            source_canonical,
            replica_canonical,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn replica(&self) -> &Path {
        &self.replica
    }

    pub fn root(&self, kind: RootKind) -> &Path {
        match kind {
            RootKind::Source => &self.source,
            RootKind::Replica => &self.replica,
        }
    }

    /// Pair a path found while walking the `kind` tree with its counterpart.
    ///
    /// Returns `None` when `path` does not live under that root.
    pub fn pair(&self, kind: RootKind, path: &Path) -> Option<PathPair> {
        let relative = path.strip_prefix(self.root(kind)).ok()?.to_path_buf();
        let counterpart = rebase(self.root(kind.other()), &relative);
        let found = path.to_path_buf();
        let (source, replica) = match kind {
            RootKind::Source => (found, counterpart),
            RootKind::Replica => (counterpart, found),
        };
        Some(PathPair {
            source,
            replica,
            relative,
        })
    }

    /// Reject auxiliary paths (such as the digest manifest) that would be
    /// mirrored or pruned because they live inside one of the trees.
    pub fn ensure_outside(&self, path: &Path) -> Result<(), RootsError> {
        let resolved = canonicalize_lenient(path).map_err(|source| RootsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        for (kind, root) in [
            (RootKind::Source, &self.source_canonical),
            (RootKind::Replica, &self.replica_canonical),
        ] {
            if resolved.starts_with(root) {
                return Err(RootsError::InsideRoot {
                    kind,
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

fn rebase(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn inspect_root(kind: RootKind, path: &Path, issues: &mut Vec<RootsError>) -> Option<PathBuf> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => match dunce::canonicalize(path) {
            Ok(canonical) => Some(canonical),
            Err(source) => {
                issues.push(RootsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
                None
            }
        },
        Ok(_) => {
            issues.push(RootsError::NotADirectory {
                kind,
                path: path.to_path_buf(),
            });
            None
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            issues.push(RootsError::Missing {
                kind,
                path: path.to_path_buf(),
            });
            None
        }
        Err(source) => {
            issues.push(RootsError::Io {
                path: path.to_path_buf(),
                source,
            });
            None
        }
    }
}

/// Canonicalize a path that may not exist yet by resolving its nearest
/// existing ancestor and re-appending the rest.
fn canonicalize_lenient(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    loop {
        if existing.exists() {
            let mut resolved = dunce::canonicalize(existing)?;
            for part in tail.iter().rev() {
                resolved.push(part);
            }
            return Ok(resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}
