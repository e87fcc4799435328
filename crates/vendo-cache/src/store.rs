//! The content cache itself

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::CacheConfig;
use crate::index::CacheIndex;
use crate::{Error, Result};

const LOCK_FILE: &str = ".lock";
const INDEX_FILE: &str = "index.json";
const BLOBS_DIR: &str = "blobs";
const INCOMING_PREFIX: &str = ".incoming-";

/// A cache hit: an open handle on the stored artifact.
///
/// The handle stays valid even if a concurrent process evicts the entry
/// after it was returned.
#[derive(Debug)]
pub struct CachedArtifact {
    pub file: File,
    pub size: u64,
}

/// Result of offering an artifact to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// Larger than the whole budget; not cached
    TooLarge { size: u64, max_size: u64 },
    /// Caching failed and was skipped
    Degraded { message: String },
}

/// How a fetch interacted with the cache, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// No cache configured, or the artifact has no stable identity
    #[default]
    Disabled,
    /// Served from the cache without a network pull
    Hit,
    /// Pulled and stored for next time
    Stored,
    /// Pulled but not stored
    Skipped { reason: String },
}

impl From<PutOutcome> for CacheStatus {
    fn from(outcome: PutOutcome) -> Self {
        match outcome {
            PutOutcome::Stored => Self::Stored,
            PutOutcome::TooLarge { size, max_size } => Self::Skipped {
                reason: format!("{size} bytes exceeds cache budget of {max_size} bytes"),
            },
            PutOutcome::Degraded { message } => Self::Skipped { reason: message },
        }
    }
}

/// Held while the index is read or modified; released on drop.
struct IndexLock {
    file: File,
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Size-bounded LRU artifact store shared across processes.
#[derive(Debug, Clone)]
pub struct ContentCache {
    config: CacheConfig,
}

impl ContentCache {
    /// Open (creating if needed) the cache described by `config`.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let blobs = config.root.join(BLOBS_DIR);
        fs::create_dir_all(&blobs).map_err(|e| Error::io(&blobs, e))?;
        tracing::debug!(root = %config.root.display(), max_size = config.max_size, "Opened cache");
        Ok(Self { config })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn index_path(&self) -> PathBuf {
        self.config.root.join(INDEX_FILE)
    }

    fn blobs_dir(&self) -> PathBuf {
        self.config.root.join(BLOBS_DIR)
    }

    fn blob_name(key: &str) -> String {
        vendo_fs::checksum::sha256_hex(key.as_bytes())
    }

    fn lock(&self) -> Result<IndexLock> {
        let path = self.config.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        file.lock_exclusive()
            .map_err(|_| Error::LockFailed { path: path.clone() })?;
        Ok(IndexLock { file })
    }

    /// Load the index; an unreadable index is replaced by an empty one and
    /// the blobs it described are removed. Must be called under the lock.
    fn load_index(&self) -> Result<CacheIndex> {
        let path = self.index_path();
        match CacheIndex::load(&path) {
            Ok(index) => Ok(index),
            Err(Error::Index { message, .. }) => {
                tracing::warn!(path = %path.display(), error = %message, "Rebuilding unreadable cache index");
                self.remove_orphans(&CacheIndex::default());
                let index = CacheIndex::default();
                index.save(&path)?;
                Ok(index)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete blobs not referenced by `index`. In-flight writes are kept.
    fn remove_orphans(&self, index: &CacheIndex) {
        let blobs = self.blobs_dir();
        let Ok(entries) = fs::read_dir(&blobs) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(INCOMING_PREFIX) {
                continue;
            }
            if !index.entries.values().any(|e| e.blob == name) {
                remove_blob(&entry.path());
            }
        }
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&self, key: &str) -> Result<Option<CachedArtifact>> {
        let _lock = self.lock()?;
        let mut index = self.load_index()?;

        let Some(entry) = index.entries.get(key).cloned() else {
            tracing::debug!(key, "Cache miss");
            return Ok(None);
        };

        let blob_path = self.blobs_dir().join(&entry.blob);
        let file = match File::open(&blob_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(key, "Cache entry lost its blob; dropping it");
                index.entries.remove(key);
                index.save(&self.index_path())?;
                return Ok(None);
            }
            Err(e) => return Err(Error::io(&blob_path, e)),
        };

        index.touch(key);
        index.save(&self.index_path())?;
        tracing::debug!(key, size = entry.size, "Cache hit");
        Ok(Some(CachedArtifact {
            file,
            size: entry.size,
        }))
    }

    /// Whether `key` is currently cached. Does not refresh recency.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let _lock = self.lock()?;
        Ok(self.load_index()?.entries.contains_key(key))
    }

    /// Total bytes currently accounted in the index.
    pub fn total_size(&self) -> Result<u64> {
        let _lock = self.lock()?;
        Ok(self.load_index()?.total_size())
    }

    /// Copy the file at `path` into the cache under `key`, evicting least
    /// recently used entries until it fits.
    pub fn put_file(&self, key: &str, path: &Path) -> Result<PutOutcome> {
        let size = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
        let max_size = self.config.max_size;
        if size > max_size {
            tracing::info!(key, size, max_size, "Artifact exceeds cache budget; not caching");
            return Ok(PutOutcome::TooLarge { size, max_size });
        }

        // Copy outside the lock; only the swap into place is serialized
        let blobs = self.blobs_dir();
        let mut incoming = tempfile::Builder::new()
            .prefix(INCOMING_PREFIX)
            .tempfile_in(&blobs)
            .map_err(|e| Error::io(&blobs, e))?;
        let mut source = File::open(path).map_err(|e| Error::io(path, e))?;
        io::copy(&mut source, incoming.as_file_mut()).map_err(|e| Error::io(path, e))?;
        incoming
            .as_file()
            .sync_all()
            .map_err(|e| Error::io(incoming.path(), e))?;

        let _lock = self.lock()?;
        let mut index = self.load_index()?;

        for victim in index.plan_eviction(size, max_size, key) {
            if let Some(entry) = index.entries.remove(&victim) {
                tracing::debug!(key = %victim, size = entry.size, "Evicting cache entry");
                remove_blob(&blobs.join(&entry.blob));
            }
        }

        let blob = Self::blob_name(key);
        let blob_path = blobs.join(&blob);
        incoming
            .persist(&blob_path)
            .map_err(|e| Error::io(&blob_path, e.error))?;
        index.insert(key, blob, size);
        index.save(&self.index_path())?;

        tracing::debug!(key, size, total = index.total_size(), "Stored cache entry");
        Ok(PutOutcome::Stored)
    }

    /// Like [`put_file`](Self::put_file) but never fails: errors are logged
    /// and reported as [`PutOutcome::Degraded`].
    pub fn store_file(&self, key: &str, path: &Path) -> PutOutcome {
        match self.put_file(key, path) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache write failed; continuing without caching");
                PutOutcome::Degraded {
                    message: e.to_string(),
                }
            }
        }
    }
}

fn remove_blob(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache blob");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn cache(max_size: u64) -> (TempDir, ContentCache) {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::open(CacheConfig::new(dir.path().join("cache"), max_size)).unwrap();
        (dir, cache)
    }

    fn artifact(dir: &TempDir, name: &str, size: usize) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, vec![b'x'; size]).unwrap();
        path
    }

    fn read(artifact: CachedArtifact) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut file = artifact.file;
        file.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn put_then_get() {
        let (dir, cache) = cache(100);
        let path = dir.path().join("a");
        fs::write(&path, b"hello").unwrap();

        assert_eq!(cache.put_file("k", &path).unwrap(), PutOutcome::Stored);
        let hit = cache.get("k").unwrap().unwrap();
        assert_eq!(hit.size, 5);
        assert_eq!(read(hit), b"hello");
        assert!(cache.get("other").unwrap().is_none());
    }

    #[test]
    fn oversized_artifact_is_not_cached() {
        let (dir, cache) = cache(10);
        let path = artifact(&dir, "big", 11);
        assert_eq!(
            cache.put_file("big", &path).unwrap(),
            PutOutcome::TooLarge {
                size: 11,
                max_size: 10
            }
        );
        assert!(!cache.contains("big").unwrap());
    }

    #[test]
    fn evicts_least_recently_used() {
        let (dir, cache) = cache(10);
        cache.put_file("a", &artifact(&dir, "a", 4)).unwrap();
        cache.put_file("b", &artifact(&dir, "b", 4)).unwrap();
        // Refresh "a" so "b" becomes the eviction candidate
        cache.get("a").unwrap().unwrap();
        cache.put_file("c", &artifact(&dir, "c", 4)).unwrap();

        assert!(cache.contains("a").unwrap());
        assert!(!cache.contains("b").unwrap());
        assert!(cache.contains("c").unwrap());
        assert_eq!(cache.total_size().unwrap(), 8);
    }

    #[test]
    fn replacing_key_does_not_double_count() {
        let (dir, cache) = cache(8);
        cache.put_file("a", &artifact(&dir, "a1", 5)).unwrap();
        cache.put_file("a", &artifact(&dir, "a2", 6)).unwrap();
        assert_eq!(cache.total_size().unwrap(), 6);
        assert_eq!(read(cache.get("a").unwrap().unwrap()).len(), 6);
    }

    #[test]
    fn corrupt_index_is_rebuilt_and_orphans_removed() {
        let (dir, cache) = cache(100);
        cache.put_file("a", &artifact(&dir, "a", 3)).unwrap();
        fs::write(cache.index_path(), b"{not json").unwrap();

        assert!(cache.get("a").unwrap().is_none());
        let leftover = fs::read_dir(cache.blobs_dir()).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn missing_blob_is_treated_as_miss() {
        let (dir, cache) = cache(100);
        cache.put_file("a", &artifact(&dir, "a", 3)).unwrap();
        fs::remove_file(cache.blobs_dir().join(ContentCache::blob_name("a"))).unwrap();

        assert!(cache.get("a").unwrap().is_none());
        assert!(!cache.contains("a").unwrap());
    }

    #[test]
    fn store_file_degrades_on_missing_source() {
        let (dir, cache) = cache(100);
        let outcome = cache.store_file("a", &dir.path().join("missing"));
        assert!(matches!(outcome, PutOutcome::Degraded { .. }));
    }

    #[test]
    fn open_handle_survives_eviction() {
        let (dir, cache) = cache(4);
        cache.put_file("a", &artifact(&dir, "a", 4)).unwrap();
        let hit = cache.get("a").unwrap().unwrap();
        cache.put_file("b", &artifact(&dir, "b", 4)).unwrap();
        assert!(!cache.contains("a").unwrap());
        assert_eq!(read(hit).len(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn total_never_exceeds_budget(
            budget in 0u64..64,
            puts in proptest::collection::vec((0u8..6, 0usize..40), 1..12),
        ) {
            let (dir, cache) = cache(budget);
            for (i, (key, size)) in puts.iter().enumerate() {
                let path = artifact(&dir, &format!("src-{i}"), *size);
                cache.put_file(&format!("key-{key}"), &path).unwrap();
                prop_assert!(cache.total_size().unwrap() <= budget);
            }

            let index = CacheIndex::load(&cache.index_path()).unwrap();
            for entry in index.entries.values() {
                let on_disk = fs::metadata(cache.blobs_dir().join(&entry.blob)).unwrap().len();
                prop_assert_eq!(on_disk, entry.size);
            }
        }
    }
}
