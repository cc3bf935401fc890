//! File-based store implementation.
//!
//! [`FileStore`] stores each entry as a single file under its root directory.
//! The file name is the percent-encoded key, and the file holds a fixed header
//! followed by the data:
//!
//! ```text
//! [expires_at_ms: u64 LE][data bytes]
//! ```
//!
//! On read, only the header is read first to check expiry. The data is read
//! only when the entry is still fresh.
//!
//! On construction, [`FileStore`] validates a `VERSION` file in the root. If
//! the version mismatches or is missing, the entire directory is wiped and
//! recreated, so entries written by an incompatible build are never read.
//!
//! This store has no tag support; [`ContentCache`](crate::ContentCache)
//! degrades to exact-key removal on top of it.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::KeyValueStore;

/// Characters kept verbatim in file names.
const FILE_NAME_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Name of the version marker file.
const VERSION_FILE: &str = "VERSION";

/// File-based [`KeyValueStore`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- VERSION                          # contains the store version string
/// +-- naptab%3Acontent%3Aprofile       # entry for key "naptab:content:profile"
/// +-- ...
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a new file-based store at `root`, validating the store version.
    ///
    /// If the `VERSION` file inside `root` does not match `version`, the entire
    /// directory is removed and recreated with the new version. Errors during
    /// validation are logged but never fatal.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        validate_version(&root, version);
        Self { root }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root
            .join(utf8_percent_encode(key, FILE_NAME_SET).to_string())
    }
}

/// Milliseconds since the Unix epoch.
fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut file = File::open(self.entry_path(key)).ok()?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header).ok()?;
        let expires_at = u64::from_le_bytes(header);

        if unix_millis(SystemTime::now()) >= expires_at {
            return None;
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data).ok()?;
        Some(data)
    }

    fn put(&self, key: &str, value: &[u8], ttl: Duration) {
        let expires_at = SystemTime::now()
            .checked_add(ttl)
            .map_or(u64::MAX, unix_millis);

        let mut buf = Vec::with_capacity(8 + value.len());
        buf.extend_from_slice(&expires_at.to_le_bytes());
        buf.extend_from_slice(value);

        // Write failures only cost a future miss
        if let Err(e) = fs::create_dir_all(&self.root) {
            tracing::warn!(error = %e, "failed to create cache directory");
            return;
        }
        if let Err(e) = fs::write(self.entry_path(key), &buf) {
            tracing::warn!(key, error = %e, "failed to write cache entry");
        }
    }

    fn forget(&self, key: &str) -> bool {
        fs::remove_file(self.entry_path(key)).is_ok()
    }

    fn clear_prefix(&self, prefix: &str) -> usize {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == VERSION_FILE {
                continue;
            }
            let key = percent_decode_str(name).decode_utf8_lossy();
            if key.starts_with(prefix) && fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

/// Validate the store version, wiping the directory on mismatch.
fn validate_version(root: &Path, version: &str) {
    let version_file = root.join(VERSION_FILE);

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            tracing::debug!("cache version matches: {version}");
            return;
        }
        Ok(stored) => {
            tracing::info!(
                "cache version mismatch (stored={stored}, current={version}), wiping cache"
            );
        }
        Err(_) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_put_and_get() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"), "v1");

        store.put("naptab:content:profile", b"<p>profile</p>", TTL);
        assert_eq!(
            store.get("naptab:content:profile"),
            Some(b"<p>profile</p>".to_vec())
        );
        assert_eq!(store.get("naptab:content:other"), None);
    }

    #[test]
    fn test_key_is_percent_encoded_on_disk() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let store = FileStore::new(root.clone(), "v1");

        store.put("ns:content:../../etc", b"x", TTL);

        assert!(root.join("ns%3Acontent%3A%2E%2E%2F%2E%2E%2Fetc").exists());
        assert_eq!(store.get("ns:content:../../etc"), Some(b"x".to_vec()));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"), "v1");

        store.put("key", b"data", Duration::MAX);
        assert_eq!(store.get("key"), Some(b"data".to_vec()));
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"), "v1");

        store.put("key", b"data", Duration::from_millis(10));
        thread::sleep(Duration::from_millis(30));

        assert_eq!(store.get("key"), None);
    }

    #[test]
    fn test_forget() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"), "v1");

        store.put("key", b"data", TTL);
        assert!(store.forget("key"));
        assert!(!store.forget("key"));
        assert_eq!(store.get("key"), None);
    }

    #[test]
    fn test_clear_prefix_keeps_version_and_other_keys() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let store = FileStore::new(root.clone(), "v1");

        store.put("ns:content:a", b"a", TTL);
        store.put("ns:content:b", b"b", TTL);
        store.put("other:content:a", b"c", TTL);

        assert_eq!(store.clear_prefix("ns:"), 2);
        assert_eq!(store.get("other:content:a"), Some(b"c".to_vec()));
        assert!(root.join(VERSION_FILE).exists());
    }

    #[test]
    fn test_has_no_tag_support() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("cache"), "v1");
        assert!(store.as_tagged().is_none());
    }

    #[test]
    fn test_version_match_keeps_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        let store = FileStore::new(root.clone(), "v1");
        store.put("key", b"preserved", TTL);

        let store2 = FileStore::new(root, "v1");
        assert_eq!(store2.get("key"), Some(b"preserved".to_vec()));
    }

    #[test]
    fn test_version_mismatch_wipes_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        let store = FileStore::new(root.clone(), "v1");
        store.put("key", b"will-be-wiped", TTL);

        let store2 = FileStore::new(root.clone(), "v2");
        assert_eq!(store2.get("key"), None);

        let version = fs::read_to_string(root.join(VERSION_FILE)).unwrap();
        assert_eq!(version, "v2");
    }

    #[test]
    fn test_truncated_entry_reads_as_absent() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let store = FileStore::new(root.clone(), "v1");

        fs::write(root.join("short"), [1u8, 2, 3]).unwrap();
        assert_eq!(store.get("short"), None);
    }
}
