//! treesync core library — root validation, path pairing, errors.
//!
//! Public API surface:
//! - [`types`] — [`RootKind`] and [`PathPair`]
//! - [`roots`] — [`SyncRoots`]: preflight checks and structural rebasing
//! - [`error`] — [`RootsError`]

pub mod error;
pub mod roots;
pub mod types;

pub use error::RootsError;
pub use roots::SyncRoots;
pub use types::{PathPair, RootKind};
