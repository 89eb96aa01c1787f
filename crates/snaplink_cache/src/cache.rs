//! Session-scoped transform cache.
//!
//! [`TransformCache`] ties the namespace manifest and the record store together.
//! A session is `load_or_create` → any number of `get`/`put` → `dispose`.
//! Every record read or written during the session is marked touched; dispose
//! evicts the rest, so the namespace only ever holds the files relevant to the
//! most recent generation under its key.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use snaplink_common::ContentHash;

use crate::artifact::ArtifactStore;
use crate::error::CacheError;
use crate::manifest::{NamespaceManifest, RecordEntry};
use crate::record::{fingerprint, CacheRecord};

/// Outcome of [`TransformCache::dispose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisposeStats {
    /// Records touched this session and kept.
    pub kept: usize,
    /// Records not touched this session and removed from the manifest.
    pub evicted: usize,
    /// Record files deleted from disk (evicted records plus orphans).
    pub files_removed: usize,
}

/// Persistent transform cache for one invalidation key.
pub struct TransformCache {
    /// `<root>/ns-<hash of key>`.
    namespace_dir: PathBuf,

    /// The opaque key discriminating this namespace.
    invalidation_key: String,

    /// Live record keys of the namespace, including this session's writes.
    manifest: NamespaceManifest,

    /// Record file storage.
    store: ArtifactStore,

    /// Keys read or written during this session.
    touched: BTreeSet<String>,
}

impl TransformCache {
    /// Opens the namespace for `invalidation_key` under `root`, creating an
    /// empty one if none exists.
    ///
    /// An existing manifest that cannot be read or parsed, or that belongs
    /// to a different key, is an error.
    pub fn load_or_create(root: &Path, invalidation_key: &str) -> Result<Self, CacheError> {
        let namespace_dir = root.join(namespace_dir_name(invalidation_key));

        let manifest = match NamespaceManifest::load(&namespace_dir)? {
            Some(m) if m.invalidation_key != invalidation_key => {
                return Err(CacheError::NamespaceMismatch {
                    expected: invalidation_key.to_string(),
                    found: m.invalidation_key,
                });
            }
            Some(m) => m,
            None => {
                let fresh = NamespaceManifest::new(invalidation_key);
                fresh.save(&namespace_dir)?;
                fresh
            }
        };

        log::debug!(
            "opened transform cache {} with {} record(s)",
            namespace_dir.display(),
            manifest.records.len()
        );

        Ok(Self {
            store: ArtifactStore::new(&namespace_dir),
            namespace_dir,
            invalidation_key: invalidation_key.to_string(),
            manifest,
            touched: BTreeSet::new(),
        })
    }

    /// Looks up the record for `path` with the given content.
    ///
    /// Marks the record touched if found.
    pub fn get(&mut self, path: &Path, original: &str) -> Result<Option<CacheRecord>, CacheError> {
        let key = fingerprint(&self.invalidation_key, path, original).to_string();
        if !self.manifest.records.contains_key(&key) {
            return Ok(None);
        }

        let bytes = self.store.read(&key)?;
        let (record, _): (CacheRecord, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                |e| CacheError::CorruptRecord {
                    key: key.clone(),
                    reason: format!("undecodable payload: {e}"),
                },
            )?;

        if record.path != path || record.original != original {
            return Err(CacheError::CorruptRecord {
                key,
                reason: format!("record describes {}", record.path.display()),
            });
        }

        self.touched.insert(key);
        Ok(Some(record))
    }

    /// Inserts or overwrites the record under its fingerprint.
    ///
    /// The record file is written immediately; the manifest is persisted by
    /// [`dispose`](Self::dispose).
    pub fn put(&mut self, record: &CacheRecord) -> Result<ContentHash, CacheError> {
        let hash = record.fingerprint(&self.invalidation_key);
        let key = hash.to_string();

        let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard()).map_err(
            |e| CacheError::Serialization {
                reason: e.to_string(),
            },
        )?;
        self.store.write(&key, &bytes)?;

        self.manifest.records.insert(
            key.clone(),
            RecordEntry {
                path: record.path.clone(),
            },
        );
        self.touched.insert(key);
        Ok(hash)
    }

    /// Ends the session: evicts every record not touched, persists the
    /// manifest, then deletes the files of evicted records and any orphans.
    ///
    /// The manifest is written before any file is deleted, so a failure at
    /// any point leaves every listed record readable.
    pub fn dispose(mut self) -> Result<DisposeStats, CacheError> {
        let before = self.manifest.records.len();
        let touched = &self.touched;
        self.manifest.records.retain(|key, _| touched.contains(key));
        let kept = self.manifest.records.len();

        self.manifest.save(&self.namespace_dir)?;
        let live: BTreeSet<String> = self.manifest.records.keys().cloned().collect();
        let files_removed = self.store.gc(&live)?;

        let stats = DisposeStats {
            kept,
            evicted: before - kept,
            files_removed,
        };
        log::debug!(
            "disposed transform cache {}: kept {}, evicted {}, removed {} file(s)",
            self.namespace_dir.display(),
            stats.kept,
            stats.evicted,
            stats.files_removed
        );
        Ok(stats)
    }

    /// Returns every record key currently held by the namespace.
    ///
    /// Intended for debugging and tests; generation never needs it.
    pub fn persisted_keys(&self) -> BTreeSet<String> {
        self.manifest.records.keys().cloned().collect()
    }

    /// Returns the keys touched so far in this session.
    pub fn touched_keys(&self) -> &BTreeSet<String> {
        &self.touched
    }

    /// Returns the namespace directory.
    pub fn namespace_dir(&self) -> &Path {
        &self.namespace_dir
    }

    /// Returns the invalidation key.
    pub fn invalidation_key(&self) -> &str {
        &self.invalidation_key
    }
}

/// Directory name of the namespace for `invalidation_key`.
fn namespace_dir_name(invalidation_key: &str) -> String {
    format!("ns-{}", ContentHash::from_bytes(invalidation_key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, original: &str, transformed: &str, requires: &[&str]) -> CacheRecord {
        CacheRecord {
            path: PathBuf::from(path),
            original: original.to_string(),
            transformed: transformed.to_string(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            source_map: None,
        }
    }

    #[test]
    fn fresh_cache_is_empty_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        assert!(cache.persisted_keys().is_empty());
        assert!(cache.namespace_dir().join("manifest.json").exists());
        assert_eq!(cache.invalidation_key(), "v1");
    }

    #[test]
    fn put_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        let rec = record("/p/a.js", "require('./b')", "require('./b')", &["./b"]);
        cache.put(&rec).unwrap();

        let hit = cache.get(Path::new("/p/a.js"), "require('./b')").unwrap();
        assert_eq!(hit, Some(rec));
    }

    #[test]
    fn get_misses_on_changed_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        cache.put(&record("/p/a.js", "one", "one", &[])).unwrap();
        assert!(cache.get(Path::new("/p/a.js"), "two").unwrap().is_none());
    }

    #[test]
    fn overwrite_is_visible_to_later_gets() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        cache
            .put(&record("/p/a.js", "src", "src", &["./b", "./c"]))
            .unwrap();
        cache
            .put(&record("/p/a.js", "src", "global.x = 1", &[]))
            .unwrap();

        let hit = cache.get(Path::new("/p/a.js"), "src").unwrap().unwrap();
        assert_eq!(hit.transformed, "global.x = 1");
        assert!(hit.requires.is_empty());
        assert_eq!(cache.persisted_keys().len(), 1);
    }

    #[test]
    fn records_survive_sessions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
            cache.put(&record("/p/a.js", "a", "a", &[])).unwrap();
            cache.dispose().unwrap();
        }
        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        assert!(cache.get(Path::new("/p/a.js"), "a").unwrap().is_some());
    }

    #[test]
    fn reverting_content_restores_hit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        cache.put(&record("/p/a.js", "v1 body", "v1 body", &[])).unwrap();
        assert!(cache.get(Path::new("/p/a.js"), "v2 body").unwrap().is_none());
        assert!(cache.get(Path::new("/p/a.js"), "v1 body").unwrap().is_some());
    }

    #[test]
    fn dispose_evicts_untouched_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
            cache.put(&record("/p/a.js", "a", "a", &[])).unwrap();
            cache.put(&record("/p/b.js", "b", "b", &[])).unwrap();
            let stats = cache.dispose().unwrap();
            assert_eq!(stats.kept, 2);
            assert_eq!(stats.evicted, 0);
        }

        let b_key = fingerprint("v1", Path::new("/p/b.js"), "b").to_string();
        {
            let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
            assert!(cache.get(Path::new("/p/a.js"), "a").unwrap().is_some());
            let stats = cache.dispose().unwrap();
            assert_eq!(stats.kept, 1);
            assert_eq!(stats.evicted, 1);
            assert_eq!(stats.files_removed, 1);
        }

        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        assert!(!cache.persisted_keys().contains(&b_key));
        assert_eq!(cache.persisted_keys().len(), 1);
        assert!(cache.get(Path::new("/p/b.js"), "b").unwrap().is_none());
    }

    #[test]
    fn persisted_keys_match_touched_after_dispose() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
            for name in ["a", "b", "c"] {
                cache
                    .put(&record(&format!("/p/{name}.js"), name, name, &[]))
                    .unwrap();
            }
            cache.dispose().unwrap();
        }
        let touched = {
            let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
            cache.get(Path::new("/p/a.js"), "a").unwrap();
            cache.put(&record("/p/d.js", "d", "d", &[])).unwrap();
            let touched = cache.touched_keys().clone();
            cache.dispose().unwrap();
            touched
        };
        let cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        assert_eq!(cache.persisted_keys(), touched);
    }

    #[test]
    fn namespaces_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = TransformCache::load_or_create(dir.path(), "k1").unwrap();
            cache.put(&record("/p/a.js", "a", "a", &[])).unwrap();
            cache.dispose().unwrap();
        }
        {
            let mut cache = TransformCache::load_or_create(dir.path(), "k2").unwrap();
            assert!(cache.get(Path::new("/p/a.js"), "a").unwrap().is_none());
            cache.dispose().unwrap();
        }
        let mut cache = TransformCache::load_or_create(dir.path(), "k1").unwrap();
        assert!(cache.get(Path::new("/p/a.js"), "a").unwrap().is_some());
    }

    #[test]
    fn corrupt_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ns = {
            let cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
            cache.namespace_dir().to_path_buf()
        };
        std::fs::write(ns.join("manifest.json"), "{ broken").unwrap();
        assert!(matches!(
            TransformCache::load_or_create(dir.path(), "v1"),
            Err(CacheError::ManifestParse { .. })
        ));
    }

    #[test]
    fn foreign_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ns = dir.path().join(namespace_dir_name("v1"));
        NamespaceManifest::new("someone-else").save(&ns).unwrap();
        assert!(matches!(
            TransformCache::load_or_create(dir.path(), "v1"),
            Err(CacheError::NamespaceMismatch { .. })
        ));
    }

    #[test]
    fn missing_record_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        let hash = cache.put(&record("/p/a.js", "a", "a", &[])).unwrap();
        std::fs::remove_file(
            cache
                .namespace_dir()
                .join("records")
                .join(format!("{hash}.rec")),
        )
        .unwrap();
        assert!(matches!(
            cache.get(Path::new("/p/a.js"), "a"),
            Err(CacheError::Io { .. })
        ));
    }

    #[test]
    fn failed_manifest_save_keeps_record_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
            cache.put(&record("/p/a.js", "a", "a", &[])).unwrap();
            cache.put(&record("/p/b.js", "b", "b", &[])).unwrap();
            cache.dispose().unwrap();
        }

        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        assert!(cache.get(Path::new("/p/a.js"), "a").unwrap().is_some());
        let ns = cache.namespace_dir().to_path_buf();
        let b_file = ns
            .join("records")
            .join(format!("{}.rec", fingerprint("v1", Path::new("/p/b.js"), "b")));

        // A non-empty directory in place of the manifest makes the rename fail.
        std::fs::remove_file(ns.join("manifest.json")).unwrap();
        std::fs::create_dir_all(ns.join("manifest.json").join("blocker")).unwrap();

        assert!(matches!(cache.dispose(), Err(CacheError::Io { .. })));
        assert!(b_file.exists());
    }

    #[test]
    fn undecodable_record_names_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        let hash = cache.put(&record("/p/a.js", "a", "a", &[])).unwrap();
        cache.store.write(&hash.to_string(), &[0xff, 0xff, 0xff]).unwrap();

        match cache.get(Path::new("/p/a.js"), "a") {
            Err(CacheError::CorruptRecord { key, reason }) => {
                assert_eq!(key, hash.to_string());
                assert!(reason.contains("undecodable"));
            }
            other => panic!("expected CorruptRecord, got {other:?}"),
        }
    }

    #[test]
    fn dispose_removes_orphaned_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::load_or_create(dir.path(), "v1").unwrap();
        let records = cache.namespace_dir().join("records");
        std::fs::create_dir_all(&records).unwrap();
        std::fs::write(records.join("deadbeef.rec"), b"orphan").unwrap();
        let stats = cache.dispose().unwrap();
        assert_eq!(stats.files_removed, 1);
        assert!(!records.join("deadbeef.rec").exists());
    }
}
