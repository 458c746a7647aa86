//! Shared single-pass entrypoint used by the CLI and the scheduler.

use std::path::PathBuf;

use treesync_core::SyncRoots;

use crate::manifest::{self, Manifest};
use crate::reconcile::{ActionSink, LogSink, PassReport, ReconcileOptions, Reconciler};
use crate::SyncError;

/// Everything one pass needs. Cheap to clone into a blocking task.
#[derive(Debug, Clone)]
pub struct PassConfig {
    pub roots: SyncRoots,
    pub options: ReconcileOptions,
    /// Digest manifest location; `None` re-hashes every file every pass.
    pub manifest: Option<PathBuf>,
}

impl PassConfig {
    pub fn new(roots: SyncRoots) -> Self {
        Self {
            roots,
            options: ReconcileOptions::default(),
            manifest: None,
        }
    }
}

/// Run one pass, narrating actions to the log.
///
/// This is the canonical pass entrypoint for both `treesync --once` and the
/// scheduling loop.
pub fn run_pass(config: &PassConfig) -> Result<PassReport, SyncError> {
    run_pass_with(config, &mut LogSink)
}

/// Run one pass, reporting actions to `sink`.
///
/// With a manifest configured it is loaded before the pass and saved after a
/// successful one; a failed pass leaves the previous manifest in place.
pub fn run_pass_with(
    config: &PassConfig,
    sink: &mut dyn ActionSink,
) -> Result<PassReport, SyncError> {
    let reconciler = Reconciler::new(&config.roots).with_options(config.options);
    let Some(path) = &config.manifest else {
        return reconciler.run(sink);
    };

    let mut manifest = match manifest::load_at(path) {
        Ok(manifest) => manifest,
        Err(SyncError::Json(err)) => {
            tracing::warn!(
                "ignoring unreadable manifest {}: {err}",
                path.display()
            );
            Manifest::default()
        }
        Err(err) => return Err(err),
    };

    let report = reconciler.with_manifest(&mut manifest).run(sink)?;
    manifest.finish_pass(report.started_at);
    manifest::save_at(path, &manifest)?;
    tracing::debug!(
        "manifest {}: {} digest(s) reused, {} tracked",
        path.display(),
        manifest.hits(),
        manifest.files.len()
    );
    Ok(report)
}
