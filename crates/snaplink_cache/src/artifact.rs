//! Content-addressed record file storage.
//!
//! Each record is stored at `<namespace>/records/<key>.rec` behind a binary
//! header containing magic bytes, the format version, and a checksum of the
//! payload. Unlike a best-effort build cache, a damaged file is reported as
//! an error rather than a miss.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snaplink_common::ContentHash;

use crate::error::CacheError;

/// Magic bytes identifying a snaplink record file.
const RECORD_MAGIC: [u8; 4] = *b"SNAP";

/// Current record format version. Increment on breaking changes to
/// the header or payload format.
const RECORD_FORMAT_VERSION: u32 = 1;

/// Subdirectory holding record files.
const RECORD_SUBDIR: &str = "records";

/// File extension for record files.
const RECORD_EXT: &str = "rec";

/// Header prepended to every record file for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Magic bytes: must be `b"SNAP"`.
    pub magic: [u8; 4],

    /// Record format version.
    pub format_version: u32,

    /// Content hash of the payload data.
    pub checksum: ContentHash,
}

/// Store for record payloads inside one namespace directory.
pub struct ArtifactStore {
    /// `<namespace>/records`.
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at the given namespace directory.
    pub fn new(namespace_dir: &Path) -> Self {
        Self {
            dir: namespace_dir.join(RECORD_SUBDIR),
        }
    }

    /// Ensures that the record directory exists.
    pub fn ensure_dir(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })
    }

    /// Returns the file path for the record with the given key.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXT}"))
    }

    /// Writes a record payload under `key`, replacing any previous payload.
    pub fn write(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        self.ensure_dir()?;
        let path = self.record_path(key);

        let header = RecordHeader {
            magic: RECORD_MAGIC,
            format_version: RECORD_FORMAT_VERSION,
            checksum: ContentHash::from_bytes(data),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        std::fs::write(&path, &output).map_err(|e| CacheError::Io { path, source: e })
    }

    /// Reads and validates the record payload stored under `key`.
    pub fn read(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.record_path(key);
        let raw = std::fs::read(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;

        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.clone(),
            reason: reason.to_string(),
        };

        if raw.len() < 4 {
            return Err(invalid("file shorter than header length prefix"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&raw[..4]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if raw.len() < 4 + header_len {
            return Err(invalid("truncated header"));
        }

        let (header, _): (RecordHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != RECORD_MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if header.format_version != RECORD_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path,
                expected: RECORD_FORMAT_VERSION,
                actual: header.format_version,
            });
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path,
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(payload.to_vec())
    }

    /// Removes record files whose key is not in `live_keys`.
    ///
    /// Returns the number of files removed.
    pub fn gc(&self, live_keys: &BTreeSet<String>) -> Result<usize, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !live_keys.contains(stem) {
                std::fs::remove_file(&path).map_err(|e| CacheError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}
