//! # treesync-sync
//!
//! Content-digest-gated mirroring of one directory tree onto another.
//!
//! Call [`reconcile`] for a single pass with default behaviour, build a
//! [`Reconciler`] for options and a digest [`Manifest`], or use
//! [`pipeline::run_pass`] to get the same pass the scheduler runs.

pub mod checksum;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod reconcile;

pub use checksum::{digest_file, ContentDigest};
pub use error::SyncError;
pub use manifest::Manifest;
pub use pipeline::{run_pass, PassConfig};
pub use reconcile::{
    reconcile, ActionSink, LogSink, PassReport, ReconcileOptions, Reconciler, SyncAction,
};
