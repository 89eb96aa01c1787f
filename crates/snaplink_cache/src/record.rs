//! The unit of caching: one transformed source file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snaplink_common::ContentHash;

/// The cached transform result for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Absolute path of the source file.
    pub path: PathBuf,

    /// The file content the record was computed from.
    pub original: String,

    /// The code to embed for this file.
    pub transformed: String,

    /// Import and require specifiers found in `transformed`, in source order.
    pub requires: Vec<String>,

    /// Source map (v3 JSON) from `transformed` back to `original`, if a
    /// transpiler produced one.
    pub source_map: Option<String>,
}

impl CacheRecord {
    /// Returns this record's fingerprint under `invalidation_key`.
    pub fn fingerprint(&self, invalidation_key: &str) -> ContentHash {
        fingerprint(invalidation_key, &self.path, &self.original)
    }
}

/// Computes the fingerprint of `(invalidation_key, path, content)`.
///
/// Content based, so restoring a file's previous content restores its
/// previous fingerprint.
pub fn fingerprint(invalidation_key: &str, path: &Path, content: &str) -> ContentHash {
    ContentHash::builder()
        .field(invalidation_key.as_bytes())
        .field(path.to_string_lossy().as_bytes())
        .field(content.as_bytes())
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_on_every_input() {
        let base = fingerprint("k", Path::new("/a.js"), "x");
        assert_ne!(base, fingerprint("k2", Path::new("/a.js"), "x"));
        assert_ne!(base, fingerprint("k", Path::new("/b.js"), "x"));
        assert_ne!(base, fingerprint("k", Path::new("/a.js"), "y"));
    }

    #[test]
    fn fingerprint_ignores_transform_output() {
        let mut record = CacheRecord {
            path: PathBuf::from("/a.js"),
            original: "require('./b')".to_string(),
            transformed: "require('./b')".to_string(),
            requires: vec!["./b".to_string()],
            source_map: None,
        };
        let before = record.fingerprint("k");
        record.transformed = "overwritten".to_string();
        record.requires.clear();
        assert_eq!(before, record.fingerprint("k"));
    }
}
