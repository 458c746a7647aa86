//! Long-running side of treesync: logging setup, log rotation and the
//! periodic pass scheduler.

mod error;
pub mod log_rotation;
pub mod logging;
mod runtime;

pub use error::DaemonError;
pub use log_rotation::RotationPolicy;
pub use runtime::{run, run_until_signal, start_blocking, DaemonConfig, FailurePolicy, RunSummary};
