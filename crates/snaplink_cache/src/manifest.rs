//! Namespace manifest listing the records that belong to one invalidation key.
//!
//! The manifest is stored as `manifest.json` in the namespace directory. It is
//! the authority on which record keys are live: a record file without a
//! manifest entry is an orphan and is collected on the next dispose.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Name of the manifest file within a namespace directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current manifest format version.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Top-level manifest of one cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceManifest {
    /// Manifest format version.
    pub format_version: u32,

    /// The invalidation key this namespace was created for.
    pub invalidation_key: String,

    /// Live records, keyed by fingerprint hex string.
    pub records: BTreeMap<String, RecordEntry>,
}

/// Manifest entry for a single cached record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    /// Absolute path of the source file the record was computed from.
    pub path: PathBuf,
}

impl NamespaceManifest {
    /// Creates a new, empty manifest for the given invalidation key.
    pub fn new(invalidation_key: &str) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            invalidation_key: invalidation_key.to_string(),
            records: BTreeMap::new(),
        }
    }

    /// Loads the manifest from a namespace directory.
    ///
    /// Returns `Ok(None)` if no manifest exists yet. A manifest that exists
    /// but cannot be read, parsed, or has the wrong format version is an error.
    pub fn load(namespace_dir: &Path) -> Result<Option<Self>, CacheError> {
        let path = namespace_dir.join(MANIFEST_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io { path, source: e }),
        };
        let manifest: Self =
            serde_json::from_str(&content).map_err(|e| CacheError::ManifestParse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path,
                expected: MANIFEST_FORMAT_VERSION,
                actual: manifest.format_version,
            });
        }
        Ok(Some(manifest))
    }

    /// Saves the manifest to the namespace directory.
    ///
    /// Writes to a temporary file first and renames it over the old manifest,
    /// so a crash mid-write leaves the previous manifest intact.
    pub fn save(&self, namespace_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(namespace_dir).map_err(|e| CacheError::Io {
            path: namespace_dir.to_path_buf(),
            source: e,
        })?;
        let path = namespace_dir.join(MANIFEST_FILE);
        let tmp = namespace_dir.join(format!("{MANIFEST_FILE}.tmp"));
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(&tmp, json).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| CacheError::Io { path, source: e })
    }
}
