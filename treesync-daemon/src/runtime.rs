//! Pass scheduler: run a pass, wait the interval, repeat until told to stop.
//!
//! The interval is a gap measured from the end of one pass to the start of
//! the next, so passes never overlap. A stop request never interrupts a pass
//! in flight; it is honoured as soon as that pass returns.

use std::time::Duration;

use tokio::sync::broadcast;

use treesync_sync::pipeline::{self, PassConfig};
use treesync_sync::PassReport;

use crate::error::{io_err, DaemonError};

/// What to do when a pass fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the error and try again after the interval.
    #[default]
    Continue,
    /// Stop the loop and return the error.
    Abort,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub pass: PassConfig,
    pub interval: Duration,
    pub failure_policy: FailurePolicy,
    /// Stop after this many passes (successful or not). `None` runs until a
    /// stop request arrives.
    pub max_passes: Option<u64>,
}

impl DaemonConfig {
    pub fn new(pass: PassConfig, interval: Duration) -> Self {
        Self {
            pass,
            interval,
            failure_policy: FailurePolicy::default(),
            max_passes: None,
        }
    }
}

/// Totals across every pass the loop ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: u64,
    pub failed: u64,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

impl RunSummary {
    fn record(&mut self, report: &PassReport) {
        self.created += report.created();
        self.updated += report.updated();
        self.removed += report.removed();
    }
}

/// Build a runtime and run the loop until ctrl-c (or `max_passes`).
pub fn start_blocking(config: DaemonConfig) -> Result<RunSummary, DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run_until_signal(config))
}

/// Run the loop, stopping after the current pass once ctrl-c is received.
pub async fn run_until_signal(config: DaemonConfig) -> Result<RunSummary, DaemonError> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("received ctrl-c, stopping after the current pass");
                    let _ = shutdown.send(());
                }
                Err(err) => tracing::warn!(error = %err, "ctrl-c handler failed"),
            }
        })
    };

    let result = run(config, shutdown_rx).await;
    signal_handle.abort();
    drop(shutdown_tx);
    result
}

/// Run the loop until `shutdown_rx` fires (or its sender goes away) or
/// `max_passes` is reached.
pub async fn run(
    config: DaemonConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<RunSummary, DaemonError> {
    let mut summary = RunSummary::default();

    loop {
        let pass = config.pass.clone();
        let outcome = tokio::task::spawn_blocking(move || pipeline::run_pass(&pass))
            .await
            .map_err(|err| DaemonError::Join(err.to_string()))?;
        summary.passes += 1;

        match outcome {
            Ok(report) => {
                summary.record(&report);
                tracing::debug!(
                    pass = summary.passes,
                    created = report.created(),
                    updated = report.updated(),
                    removed = report.removed(),
                    unchanged = report.unchanged,
                    duration_ms = report.duration.as_millis() as u64,
                    "pass completed",
                );
            }
            Err(err) => {
                summary.failed += 1;
                tracing::error!("Synchronization pass failed: {err}");
                if config.failure_policy == FailurePolicy::Abort {
                    return Err(err.into());
                }
            }
        }

        if config.max_passes.is_some_and(|max| summary.passes >= max) {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }

    Ok(summary)
}
