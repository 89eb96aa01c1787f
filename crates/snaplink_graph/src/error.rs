//! Error types for resolution and traversal.

use std::path::PathBuf;

use snaplink_cache::CacheError;

use crate::hooks::HookError;

/// Errors raised while resolving a specifier to a file.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No candidate file exists for the specifier.
    #[error("cannot resolve `{specifier}` required from {}", .requester.display())]
    NotFound {
        /// The requesting file, or the directory resolution started from.
        requester: PathBuf,
        /// The unresolved specifier.
        specifier: String,
    },

    /// A `package.json` on the resolution path could not be read or parsed.
    #[error("invalid package descriptor {}: {reason}", .path.display())]
    PackageJson {
        /// The descriptor path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}

impl ResolveError {
    /// Replaces the requester of a [`ResolveError::NotFound`] with the file
    /// that issued the require.
    pub fn with_requester(self, requester: PathBuf) -> Self {
        match self {
            ResolveError::NotFound { specifier, .. } => ResolveError::NotFound {
                requester,
                specifier,
            },
            other => other,
        }
    }
}

/// Errors that abort a graph walk.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A specifier could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The transpile hook failed for a file.
    #[error("failed to transform {}: {source}", .path.display())]
    Transform {
        /// The file being transformed.
        path: PathBuf,
        /// The hook's error.
        source: HookError,
    },

    /// The transform cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A module source file could not be read.
    #[error("failed to read module {}: {source}", .path.display())]
    Io {
        /// The module path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
