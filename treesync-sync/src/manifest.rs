//! Digest manifest — optional size/mtime-keyed digest cache across passes.
//!
//! Persists a [`Manifest`] JSON document at a user-chosen path. An entry is
//! reused only while the file's length and modification time still match what
//! was recorded; anything else is re-read and re-hashed. Writes use an atomic
//! `.tmp` + rename.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use serde::{Deserialize, Serialize};

use treesync_core::RootKind;

use crate::checksum::{self, ContentDigest};
use crate::error::{io_err, SyncError};

/// Cached digest plus the file fingerprint it was computed for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub digest: ContentDigest,
    pub len: u64,
    pub modified_secs: i64,
    pub modified_nanos: u32,
}

/// On-disk manifest payload. Keys are `<side>:<relative path>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub synced_at: Option<DateTime<Utc>>,
    pub files: BTreeMap<String, ManifestEntry>,
    #[serde(skip)]
    seen: HashSet<String>,
    #[serde(skip)]
    hits: usize,
}

impl Manifest {
    pub fn key(kind: RootKind, relative: &str) -> String {
        format!("{}:{relative}", kind.as_str())
    }

    /// Digest `path`, reusing the cached value when its fingerprint matches.
    pub fn digest(
        &mut self,
        kind: RootKind,
        relative: &str,
        path: &Path,
    ) -> Result<ContentDigest, SyncError> {
        let key = Self::key(kind, relative);
        let (len, modified) = fingerprint(path)?;
        self.seen.insert(key.clone());

        if let Some(entry) = self.files.get(&key) {
            if entry.len == len
                && entry.modified_secs == modified.unix_seconds()
                && entry.modified_nanos == modified.nanoseconds()
            {
                self.hits += 1;
                return Ok(entry.digest.clone());
            }
        }

        let digest = checksum::digest_file(path)?;
        self.files
            .insert(key, entry_for(digest.clone(), len, modified));
        Ok(digest)
    }

    /// Record a digest already known for `path` (e.g. right after copying).
    pub fn record(
        &mut self,
        kind: RootKind,
        relative: &str,
        path: &Path,
        digest: ContentDigest,
    ) -> Result<(), SyncError> {
        let key = Self::key(kind, relative);
        let (len, modified) = fingerprint(path)?;
        self.seen.insert(key.clone());
        self.files.insert(key, entry_for(digest, len, modified));
        Ok(())
    }

    /// Number of digests served from the cache since load.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Drop every entry not touched during the pass that just finished and
    /// stamp the manifest with `synced_at`.
    pub fn finish_pass(&mut self, synced_at: DateTime<Utc>) {
        let seen = std::mem::take(&mut self.seen);
        self.files.retain(|key, _| seen.contains(key));
        self.synced_at = Some(synced_at);
    }
}

fn entry_for(digest: ContentDigest, len: u64, modified: FileTime) -> ManifestEntry {
    ManifestEntry {
        digest,
        len,
        modified_secs: modified.unix_seconds(),
        modified_nanos: modified.nanoseconds(),
    }
}

fn fingerprint(path: &Path) -> Result<(u64, FileTime), SyncError> {
    let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
    Ok((meta.len(), FileTime::from_last_modification_time(&meta)))
}

/// Load the manifest at `path`.
///
/// Returns an empty manifest if the file does not yet exist.
pub fn load_at(path: &Path) -> Result<Manifest, SyncError> {
    if !path.exists() {
        return Ok(Manifest::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save the manifest atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(path: &Path, manifest: &Manifest) -> Result<(), SyncError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let json = serde_json::to_string_pretty(manifest)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::set_file_mtime;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn empty_manifest_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let manifest = load_at(&tmp.path().join("nonexistent.json")).unwrap();
        assert!(manifest.files.is_empty());
        assert!(manifest.synced_at.is_none());
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let mut manifest = Manifest::default();
        manifest.digest(RootKind::Source, "a.txt", &file).unwrap();
        manifest.finish_pass(Utc::now());

        let path = tmp.path().join("state").join("manifest.json");
        save_at(&path, &manifest).unwrap();
        let loaded = load_at(&path).unwrap();
        assert_eq!(loaded.files, manifest.files);
        assert_eq!(loaded.synced_at, manifest.synced_at);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.json");
        save_at(&path, &Manifest::default()).unwrap();
        assert!(
            !tmp.path().join("manifest.json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn unchanged_fingerprint_reuses_cached_digest() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let mut manifest = Manifest::default();
        let first = manifest.digest(RootKind::Source, "a.txt", &file).unwrap();
        let second = manifest.digest(RootKind::Source, "a.txt", &file).unwrap();
        assert_eq!(first, second);
        assert_eq!(manifest.hits(), 1);
    }

    #[test]
    fn changed_mtime_forces_rehash() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "hello").unwrap();
        set_file_mtime(&file, FileTime::from_unix_time(1_000_000, 0)).unwrap();

        let mut manifest = Manifest::default();
        let first = manifest.digest(RootKind::Source, "a.txt", &file).unwrap();

        fs::write(&file, "jello").unwrap();
        set_file_mtime(&file, FileTime::from_unix_time(2_000_000, 0)).unwrap();
        let second = manifest.digest(RootKind::Source, "a.txt", &file).unwrap();

        assert_ne!(first, second);
        assert_eq!(manifest.hits(), 0);
    }

    #[test]
    fn finish_pass_prunes_untouched_entries() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let mut manifest = Manifest::default();
        manifest.digest(RootKind::Source, "a.txt", &file).unwrap();
        manifest.digest(RootKind::Replica, "a.txt", &file).unwrap();
        manifest.finish_pass(Utc::now());
        assert_eq!(manifest.files.len(), 2);

        manifest.digest(RootKind::Source, "a.txt", &file).unwrap();
        manifest.finish_pass(Utc::now());
        assert_eq!(
            manifest.files.keys().cloned().collect::<Vec<_>>(),
            vec!["source:a.txt".to_string()]
        );
    }
}
