//! Content digests used as the equality oracle between a source file and its
//! replica counterpart.
//!
//! Files are streamed through SHA-256 in fixed-size chunks, so memory use is
//! bounded by [`CHUNK_SIZE`] regardless of file size.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Read buffer size for streaming digests.
pub const CHUNK_SIZE: usize = 4096;

/// Lowercase hex SHA-256 of a file's full contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Digest everything `reader` yields, [`CHUNK_SIZE`] bytes at a time.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentDigest(hex::encode(hasher.finalize())))
}

/// Digest the file at `path`.
///
/// Fails with [`SyncError::Io`] when the file cannot be opened or read.
pub fn digest_file(path: &Path) -> Result<ContentDigest, SyncError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    digest_reader(file).map_err(|e| io_err(path, e))
}
