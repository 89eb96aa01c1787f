//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Every variant is fatal to the generation that hit it. The cache never
/// falls back to an empty namespace or treats a damaged record as a miss,
/// because either would silently change what gets embedded.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The namespace manifest could not be parsed as valid JSON.
    #[error("failed to parse cache manifest {path}: {reason}")]
    ManifestParse {
        /// The manifest file path.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// The manifest found in a namespace directory belongs to another key.
    #[error("cache namespace mismatch: expected key `{expected}`, found `{found}`")]
    NamespaceMismatch {
        /// The invalidation key the cache was opened with.
        expected: String,
        /// The invalidation key recorded in the manifest.
        found: String,
    },

    /// A record file has an invalid or missing header.
    #[error("invalid record header in {path}: {reason}")]
    InvalidHeader {
        /// The record file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The record file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The record or manifest format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The offending file path.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The actual format version found in the file.
        actual: u32,
    },

    /// A decoded record does not describe the file it is filed under.
    #[error("corrupt cache record {key}: {reason}")]
    CorruptRecord {
        /// The record key.
        key: String,
        /// What did not match.
        reason: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}
