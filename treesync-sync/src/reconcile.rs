//! Tree reconciler — one synchronization pass over a source and a replica tree.
//!
//! ## Pass protocol
//!
//! 1. Phase A walks source top-down. Missing replica directories are created;
//!    missing replica files are copied; existing replica files are copied
//!    over only when their content digest differs from the source file's.
//! 2. Phase B walks replica bottom-up. Inside every replica directory that
//!    still has a source counterpart, files and subdirectories without one
//!    are deleted. An orphan subdirectory is removed whole, with a single
//!    action for its root.
//!
//! The first I/O error aborts the pass. Actions already performed stay
//! performed and were already reported to the [`ActionSink`].

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use walkdir::WalkDir;

use treesync_core::{PathPair, RootKind, SyncRoots};

use crate::checksum::{self, ContentDigest};
use crate::error::{io_err, walk_err, SyncError};
use crate::manifest::Manifest;

// ---------------------------------------------------------------------------
// Actions and sinks
// ---------------------------------------------------------------------------

/// A change applied to the replica tree. Paths are replica-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    CreatedDir { path: PathBuf },
    CreatedFile { path: PathBuf },
    UpdatedFile { path: PathBuf },
    RemovedFile { path: PathBuf },
    RemovedDir { path: PathBuf },
}

impl SyncAction {
    pub fn path(&self) -> &Path {
        match self {
            SyncAction::CreatedDir { path }
            | SyncAction::CreatedFile { path }
            | SyncAction::UpdatedFile { path }
            | SyncAction::RemovedFile { path }
            | SyncAction::RemovedDir { path } => path,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            SyncAction::CreatedDir { .. } | SyncAction::CreatedFile { .. } => "Created",
            SyncAction::UpdatedFile { .. } => "Updated",
            SyncAction::RemovedFile { .. } | SyncAction::RemovedDir { .. } => "Removed",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.path().display())
    }
}

/// Receives every action the moment it has been applied.
pub trait ActionSink {
    fn record(&mut self, action: &SyncAction);
}

/// Collects actions in memory.
impl ActionSink for Vec<SyncAction> {
    fn record(&mut self, action: &SyncAction) {
        self.push(action.clone());
    }
}

/// Narrates each action as one INFO log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ActionSink for LogSink {
    fn record(&mut self, action: &SyncAction) {
        tracing::info!("{action}");
    }
}

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Resolve symbolic links in source and mirror their targets. When off,
    /// source symlinks are not mirrored.
    pub follow_symlinks: bool,
}

/// Outcome of one pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub actions: Vec<SyncAction>,
    /// Files whose replica copy already matched.
    pub unchanged: usize,
}

impl PassReport {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn created(&self) -> usize {
        self.count("Created")
    }

    pub fn updated(&self) -> usize {
        self.count("Updated")
    }

    pub fn removed(&self) -> usize {
        self.count("Removed")
    }

    fn count(&self, verb: &str) -> usize {
        self.actions.iter().filter(|a| a.verb() == verb).count()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
    Other,
}

struct Progress<'s> {
    sink: &'s mut dyn ActionSink,
    actions: Vec<SyncAction>,
    unchanged: usize,
}

impl Progress<'_> {
    fn emit(&mut self, action: SyncAction) {
        self.sink.record(&action);
        self.actions.push(action);
    }
}

/// Configurable single-pass reconciler.
pub struct Reconciler<'a> {
    roots: &'a SyncRoots,
    options: ReconcileOptions,
    manifest: Option<&'a mut Manifest>,
}

impl<'a> Reconciler<'a> {
    pub fn new(roots: &'a SyncRoots) -> Self {
        Self {
            roots,
            options: ReconcileOptions::default(),
            manifest: None,
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Serve digests from `manifest` when file fingerprints are unchanged.
    pub fn with_manifest(mut self, manifest: &'a mut Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Run both phases once.
    pub fn run(mut self, sink: &mut dyn ActionSink) -> Result<PassReport, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut progress = Progress {
            sink,
            actions: Vec::new(),
            unchanged: 0,
        };

        self.mirror_source(&mut progress)?;
        self.prune_replica(&mut progress)?;

        Ok(PassReport {
            started_at,
            duration: clock.elapsed(),
            actions: progress.actions,
            unchanged: progress.unchanged,
        })
    }

    // -- Phase A ------------------------------------------------------------

    fn mirror_source(&mut self, progress: &mut Progress<'_>) -> Result<(), SyncError> {
        let roots = self.roots;
        let root = roots.source();
        let walker = WalkDir::new(root).follow_links(self.options.follow_symlinks);
        for entry in walker {
            let entry = entry.map_err(|e| walk_err(root, e))?;
            let pair = self.pair(RootKind::Source, entry.path())?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                self.mirror_dir(&pair, progress)?;
            } else if file_type.is_file() {
                self.mirror_file(&pair, progress)?;
            } else {
                tracing::debug!("not mirrored: {}", entry.path().display());
            }
        }
        Ok(())
    }

    fn mirror_dir(&mut self, pair: &PathPair, progress: &mut Progress<'_>) -> Result<(), SyncError> {
        // The replica root was validated as a directory, possibly via a symlink.
        if pair.relative.as_os_str().is_empty() {
            return Ok(());
        }
        match probe(&pair.replica, false)? {
            Some(EntryKind::Dir) => return Ok(()),
            Some(_) => {
                fs::remove_file(&pair.replica).map_err(|e| io_err(&pair.replica, e))?;
                progress.emit(SyncAction::RemovedFile {
                    path: pair.replica.clone(),
                });
            }
            None => {}
        }
        fs::create_dir_all(&pair.replica).map_err(|e| io_err(&pair.replica, e))?;
        progress.emit(SyncAction::CreatedDir {
            path: pair.replica.clone(),
        });
        Ok(())
    }

    fn mirror_file(&mut self, pair: &PathPair, progress: &mut Progress<'_>) -> Result<(), SyncError> {
        let key = pair.relative_key();
        match probe(&pair.replica, false)? {
            None => {}
            Some(EntryKind::Dir) => {
                fs::remove_dir_all(&pair.replica).map_err(|e| io_err(&pair.replica, e))?;
                progress.emit(SyncAction::RemovedDir {
                    path: pair.replica.clone(),
                });
            }
            Some(EntryKind::Other) => {
                fs::remove_file(&pair.replica).map_err(|e| io_err(&pair.replica, e))?;
                progress.emit(SyncAction::RemovedFile {
                    path: pair.replica.clone(),
                });
            }
            Some(EntryKind::File) => {
                let source_digest = self.digest(RootKind::Source, &key, &pair.source)?;
                let replica_digest = self.digest(RootKind::Replica, &key, &pair.replica)?;
                if source_digest == replica_digest {
                    tracing::debug!("unchanged: {}", pair.replica.display());
                    progress.unchanged += 1;
                    return Ok(());
                }
                self.copy(pair, &key, Some(source_digest))?;
                progress.emit(SyncAction::UpdatedFile {
                    path: pair.replica.clone(),
                });
                return Ok(());
            }
        }

        self.copy(pair, &key, None)?;
        progress.emit(SyncAction::CreatedFile {
            path: pair.replica.clone(),
        });
        Ok(())
    }

    // -- Phase B ------------------------------------------------------------

    fn prune_replica(&mut self, progress: &mut Progress<'_>) -> Result<(), SyncError> {
        let roots = self.roots;
        let root = roots.replica();
        for entry in WalkDir::new(root).contents_first(true) {
            let entry = entry.map_err(|e| walk_err(root, e))?;
            // Both roots are directories even when reached through a symlink.
            let at_root = entry.depth() == 0;
            if !at_root && !entry.file_type().is_dir() {
                continue;
            }
            let dir = self.pair(RootKind::Replica, entry.path())?;
            // Orphan directories are removed whole by their parent.
            if !at_root
                && probe(&dir.source, self.options.follow_symlinks)? != Some(EntryKind::Dir)
            {
                continue;
            }
            self.prune_dir(&dir, progress)?;
        }
        Ok(())
    }

    fn prune_dir(&mut self, dir: &PathPair, progress: &mut Progress<'_>) -> Result<(), SyncError> {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        for child in fs::read_dir(&dir.replica).map_err(|e| io_err(&dir.replica, e))? {
            let child = child.map_err(|e| io_err(&dir.replica, e))?;
            let file_type = child.file_type().map_err(|e| io_err(child.path(), e))?;
            if file_type.is_dir() {
                subdirs.push(child.file_name());
            } else {
                files.push(child.file_name());
            }
        }
        files.sort();
        subdirs.sort();

        let follow = self.options.follow_symlinks;
        for name in files {
            if probe(&dir.source.join(&name), follow)? == Some(EntryKind::File) {
                continue;
            }
            let path = dir.replica.join(&name);
            fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            progress.emit(SyncAction::RemovedFile { path });
        }

        for name in subdirs {
            if probe(&dir.source.join(&name), follow)? == Some(EntryKind::Dir) {
                continue;
            }
            let path = dir.replica.join(&name);
            fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
            progress.emit(SyncAction::RemovedDir { path });
        }
        Ok(())
    }

    // -- helpers ------------------------------------------------------------

    fn pair(&self, kind: RootKind, path: &Path) -> Result<PathPair, SyncError> {
        self.roots
            .pair(kind, path)
            .ok_or_else(|| SyncError::Rebase {
                path: path.to_path_buf(),
                root: self.roots.root(kind).to_path_buf(),
            })
    }

    fn digest(
        &mut self,
        kind: RootKind,
        key: &str,
        path: &Path,
    ) -> Result<ContentDigest, SyncError> {
        match self.manifest.as_deref_mut() {
            Some(manifest) => manifest.digest(kind, key, path),
            None => checksum::digest_file(path),
        }
    }

    /// Copy source over replica, carrying permissions and timestamps across.
    fn copy(
        &mut self,
        pair: &PathPair,
        key: &str,
        source_digest: Option<ContentDigest>,
    ) -> Result<(), SyncError> {
        copy_preserving_times(&pair.source, &pair.replica)?;

        if self.manifest.is_some() {
            let digest = match source_digest {
                Some(digest) => digest,
                None => self.digest(RootKind::Source, key, &pair.source)?,
            };
            if let Some(manifest) = self.manifest.as_deref_mut() {
                manifest.record(RootKind::Replica, key, &pair.replica, digest)?;
            }
        }
        Ok(())
    }
}

/// Run one pass with default options and no manifest.
pub fn reconcile(roots: &SyncRoots, sink: &mut dyn ActionSink) -> Result<PassReport, SyncError> {
    Reconciler::new(roots).run(sink)
}

fn probe(path: &Path, follow_symlinks: bool) -> Result<Option<EntryKind>, SyncError> {
    let meta = if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    };
    match meta {
        Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Dir)),
        Ok(meta) if meta.is_file() => Ok(Some(EntryKind::File)),
        Ok(_) => Ok(Some(EntryKind::Other)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn copy_preserving_times(from: &Path, to: &Path) -> Result<(), SyncError> {
    let meta = fs::metadata(from).map_err(|e| io_err(from, e))?;
    fs::copy(from, to).map_err(|e| io_err(to, e))?;
    filetime::set_file_times(
        to,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
    .map_err(|e| io_err(to, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SyncRoots) {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let replica = tmp.path().join("replica");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&replica).unwrap();
        let roots = SyncRoots::resolve(source, replica).unwrap();
        (tmp, roots)
    }

    #[test]
    fn action_display_matches_log_wording() {
        let action = SyncAction::UpdatedFile {
            path: PathBuf::from("replica/a.txt"),
        };
        assert_eq!(action.to_string(), format!("Updated {}", action.path().display()));
        let removed = SyncAction::RemovedDir {
            path: PathBuf::from("replica/old"),
        };
        assert!(removed.to_string().starts_with("Removed "));
    }

    #[test]
    fn sink_receives_actions_in_order_they_happen() {
        let (_tmp, roots) = setup();
        fs::create_dir_all(roots.source().join("docs")).unwrap();
        fs::write(roots.source().join("docs").join("a.txt"), "a").unwrap();

        let mut seen: Vec<SyncAction> = Vec::new();
        let report = reconcile(&roots, &mut seen).unwrap();
        assert_eq!(seen, report.actions);
        assert_eq!(
            seen,
            vec![
                SyncAction::CreatedDir {
                    path: roots.replica().join("docs")
                },
                SyncAction::CreatedFile {
                    path: roots.replica().join("docs").join("a.txt")
                },
            ]
        );
    }

    #[test]
    fn replica_directory_in_place_of_source_file_is_replaced() {
        let (_tmp, roots) = setup();
        fs::write(roots.source().join("x"), "file").unwrap();
        fs::create_dir_all(roots.replica().join("x").join("inner")).unwrap();

        let mut seen: Vec<SyncAction> = Vec::new();
        reconcile(&roots, &mut seen).unwrap();

        assert_eq!(fs::read_to_string(roots.replica().join("x")).unwrap(), "file");
        assert_eq!(
            seen,
            vec![
                SyncAction::RemovedDir {
                    path: roots.replica().join("x")
                },
                SyncAction::CreatedFile {
                    path: roots.replica().join("x")
                },
            ]
        );
    }

    #[test]
    fn replica_file_in_place_of_source_directory_is_replaced() {
        let (_tmp, roots) = setup();
        fs::create_dir_all(roots.source().join("x")).unwrap();
        fs::write(roots.replica().join("x"), "stale").unwrap();

        let mut seen: Vec<SyncAction> = Vec::new();
        reconcile(&roots, &mut seen).unwrap();

        assert!(roots.replica().join("x").is_dir());
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].verb(), "Removed");
        assert!(matches!(seen[1], SyncAction::CreatedDir { .. }));
    }

    #[test]
    fn report_counts_by_verb() {
        let (_tmp, roots) = setup();
        fs::write(roots.source().join("new.txt"), "n").unwrap();
        fs::write(roots.source().join("same.txt"), "s").unwrap();
        fs::write(roots.replica().join("same.txt"), "s").unwrap();
        fs::write(roots.source().join("changed.txt"), "v2").unwrap();
        fs::write(roots.replica().join("changed.txt"), "v1").unwrap();
        fs::write(roots.replica().join("gone.txt"), "g").unwrap();

        let report = reconcile(&roots, &mut Vec::<SyncAction>::new()).unwrap();
        assert_eq!(report.created(), 1);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.removed(), 1);
        assert_eq!(report.unchanged, 1);
        assert!(!report.is_noop());
    }

    #[test]
    fn manifest_is_filled_for_both_sides() {
        let (_tmp, roots) = setup();
        fs::write(roots.source().join("a.txt"), "hello").unwrap();

        let mut manifest = Manifest::default();
        Reconciler::new(&roots)
            .with_manifest(&mut manifest)
            .run(&mut Vec::<SyncAction>::new())
            .unwrap();

        assert!(manifest.files.contains_key("source:a.txt"));
        assert!(manifest.files.contains_key("replica:a.txt"));
        assert_eq!(
            manifest.files["source:a.txt"].digest,
            manifest.files["replica:a.txt"].digest
        );
    }

    #[test]
    #[cfg(unix)]
    fn source_symlinks_are_skipped_unless_followed() {
        let (_tmp, roots) = setup();
        fs::write(roots.source().join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink(
            roots.source().join("target.txt"),
            roots.source().join("link.txt"),
        )
        .unwrap();

        reconcile(&roots, &mut Vec::<SyncAction>::new()).unwrap();
        assert!(!roots.replica().join("link.txt").exists());

        Reconciler::new(&roots)
            .with_options(ReconcileOptions {
                follow_symlinks: true,
            })
            .run(&mut Vec::<SyncAction>::new())
            .unwrap();
        let copied = roots.replica().join("link.txt");
        assert!(fs::symlink_metadata(&copied).unwrap().is_file());
        assert_eq!(fs::read_to_string(copied).unwrap(), "t");
    }

    #[test]
    #[cfg(unix)]
    fn symlinked_replica_root_is_kept_and_synced_through() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let real_replica = tmp.path().join("real-replica");
        let replica = tmp.path().join("replica");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&real_replica).unwrap();
        std::os::unix::fs::symlink(&real_replica, &replica).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        fs::write(real_replica.join("a.txt"), "a").unwrap();
        fs::write(source.join("b.txt"), "b").unwrap();
        fs::write(real_replica.join("orphan.txt"), "o").unwrap();
        let roots = SyncRoots::resolve(&source, &replica).unwrap();

        let mut seen: Vec<SyncAction> = Vec::new();
        reconcile(&roots, &mut seen).unwrap();

        assert!(fs::symlink_metadata(&replica).unwrap().file_type().is_symlink());
        assert_eq!(
            seen,
            vec![
                SyncAction::CreatedFile {
                    path: replica.join("b.txt")
                },
                SyncAction::RemovedFile {
                    path: replica.join("orphan.txt")
                },
            ]
        );
        assert_eq!(fs::read_to_string(real_replica.join("b.txt")).unwrap(), "b");
        assert!(!real_replica.join("orphan.txt").exists());
    }

    #[test]
    #[cfg(unix)]
    fn symlinked_source_root_still_prunes_top_level_orphans() {
        let tmp = TempDir::new().unwrap();
        let real_source = tmp.path().join("real-source");
        let source = tmp.path().join("source");
        let replica = tmp.path().join("replica");
        fs::create_dir_all(&real_source).unwrap();
        fs::create_dir_all(&replica).unwrap();
        std::os::unix::fs::symlink(&real_source, &source).unwrap();
        fs::write(real_source.join("a.txt"), "a").unwrap();
        fs::write(replica.join("orphan.txt"), "o").unwrap();
        fs::create_dir_all(replica.join("old")).unwrap();
        let roots = SyncRoots::resolve(&source, &replica).unwrap();

        let mut seen: Vec<SyncAction> = Vec::new();
        reconcile(&roots, &mut seen).unwrap();

        assert_eq!(fs::read_to_string(replica.join("a.txt")).unwrap(), "a");
        assert!(!replica.join("orphan.txt").exists());
        assert!(!replica.join("old").exists());
        assert!(seen.contains(&SyncAction::RemovedFile {
            path: replica.join("orphan.txt")
        }));
        assert!(seen.contains(&SyncAction::RemovedDir {
            path: replica.join("old")
        }));
    }

    #[test]
    #[cfg(unix)]
    fn followed_directory_symlink_is_mirrored_and_survives_pruning() {
        let (tmp, roots) = setup();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("inner.txt"), "i").unwrap();
        std::os::unix::fs::symlink(&outside, roots.source().join("linked")).unwrap();
        let follow = ReconcileOptions {
            follow_symlinks: true,
        };

        Reconciler::new(&roots)
            .with_options(follow)
            .run(&mut Vec::<SyncAction>::new())
            .unwrap();
        let mirrored = roots.replica().join("linked");
        assert!(fs::symlink_metadata(&mirrored).unwrap().is_dir());
        assert_eq!(fs::read_to_string(mirrored.join("inner.txt")).unwrap(), "i");

        let mut second: Vec<SyncAction> = Vec::new();
        Reconciler::new(&roots)
            .with_options(follow)
            .run(&mut second)
            .unwrap();
        assert!(second.is_empty(), "unexpected actions: {second:?}");
        assert!(mirrored.join("inner.txt").exists());
    }

    #[test]
    #[cfg(unix)]
    fn orphan_replica_symlink_is_removed_as_a_file() {
        let (tmp, roots) = setup();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("keep.txt"), "k").unwrap();
        let link = roots.replica().join("stray");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        let mut seen: Vec<SyncAction> = Vec::new();
        reconcile(&roots, &mut seen).unwrap();

        assert_eq!(seen, vec![SyncAction::RemovedFile { path: link.clone() }]);
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(outside.join("keep.txt").exists(), "link target must be untouched");
    }
}
