//! treesync — keep a replica directory tree identical to a source tree.
//!
//! # Usage
//!
//! ```text
//! treesync <SOURCE> <REPLICA> <LOG_FILE> <INTERVAL>
//!          [--once] [--stop-on-error] [--follow-symlinks]
//!          [--manifest <PATH>] [--max-log-bytes <N>] [--max-log-files <N>]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use treesync_core::SyncRoots;
use treesync_daemon::log_rotation::{DEFAULT_MAX_BYTES, DEFAULT_MAX_FILES};
use treesync_daemon::{logging, start_blocking, DaemonConfig, FailurePolicy, RotationPolicy};
use treesync_sync::{PassConfig, ReconcileOptions};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "treesync",
    version,
    about = "Periodically mirror a source folder into a replica folder",
    long_about = None,
)]
struct Cli {
    /// Path to the source folder.
    source: PathBuf,

    /// Path to the replica folder.
    replica: PathBuf,

    /// Path to the log file (created or appended to).
    log_file: PathBuf,

    /// Seconds to wait after one pass finishes before starting the next.
    interval: u64,

    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,

    /// Exit on the first failed pass instead of retrying after the interval.
    #[arg(long)]
    stop_on_error: bool,

    /// Mirror the targets of symbolic links found in the source tree.
    #[arg(long)]
    follow_symlinks: bool,

    /// Cache digests in this JSON file so unchanged files are not re-read.
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Rotate the log file at startup once it reaches this many bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_BYTES)]
    max_log_bytes: u64,

    /// Number of rotated log files to keep.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_FILES)]
    max_log_files: usize,
}

impl Cli {
    fn run(self) -> Result<()> {
        let rotation = RotationPolicy {
            max_bytes: self.max_log_bytes,
            max_files: self.max_log_files,
        };
        let rotated = rotation
            .apply(&self.log_file)
            .with_context(|| format!("failed to rotate {}", self.log_file.display()))?;
        logging::init(&self.log_file).context("failed to set up logging")?;
        if rotated {
            tracing::debug!("rotated log file {}", self.log_file.display());
        }

        let config = self.daemon_config()?;
        let summary = start_blocking(config).context("synchronization stopped with an error")?;
        tracing::debug!(
            passes = summary.passes,
            failed = summary.failed,
            "scheduler exited"
        );
        Ok(())
    }

    /// Validate roots and auxiliary paths, logging every problem at ERROR.
    fn daemon_config(&self) -> Result<DaemonConfig> {
        let roots = match SyncRoots::resolve(&self.source, &self.replica) {
            Ok(roots) => roots,
            Err(issues) => {
                for issue in &issues {
                    tracing::error!("{issue}");
                }
                bail!("{} preflight check(s) failed; nothing was synchronized", issues.len());
            }
        };

        if let Err(issue) = roots.ensure_outside(&self.log_file) {
            tracing::error!("Log file path rejected: {issue}");
            bail!("log file must live outside the source and replica folders");
        }

        if let Some(manifest) = &self.manifest {
            if let Err(issue) = roots.ensure_outside(manifest) {
                tracing::error!("Manifest path rejected: {issue}");
                bail!("manifest must live outside the source and replica folders");
            }
        }

        let pass = PassConfig {
            roots,
            options: ReconcileOptions {
                follow_symlinks: self.follow_symlinks,
            },
            manifest: self.manifest.clone(),
        };

        let mut config = DaemonConfig::new(pass, Duration::from_secs(self.interval));
        if self.once {
            config.max_passes = Some(1);
        }
        if self.once || self.stop_on_error {
            config.failure_policy = FailurePolicy::Abort;
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    Cli::parse().run()
}
