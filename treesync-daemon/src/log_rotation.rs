//! Size-based rotation of the sync log, applied once before the file is opened.
//!
//! Numbering scheme: `sync.log` → `sync.log.1` → `sync.log.2` → … → `sync.log.N`,
//! where `.1` is always the most recent backup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default size threshold (10 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of backups kept.
pub const DEFAULT_MAX_FILES: usize = 5;

/// When to rotate and how many backups to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    /// Backups kept; `0` truncates the log in place instead of rotating.
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log_path` if it has reached `max_bytes`.
    ///
    /// Returns `true` if the log was rotated (or truncated), `false` if it was
    /// under the threshold or does not exist yet.
    pub fn apply(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        if self.max_files > 0 {
            let oldest = backup_path(log_path, self.max_files);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..self.max_files).rev() {
                let from = backup_path(log_path, n);
                if from.exists() {
                    fs::rename(&from, backup_path(log_path, n + 1))?;
                }
            }
            fs::rename(log_path, backup_path(log_path, 1))?;
        }

        fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(log_path)?;
        Ok(true)
    }
}

/// `<log>.<n>`, e.g. `sync.log.2`.
fn backup_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}
