//! Persistent, content-addressed transform cache.
//!
//! Records the result of transforming one source file (transformed code,
//! discovered require specifiers, optional source map) under a fingerprint of
//! the invalidation key, the file path and the file content. Each invalidation
//! key owns a disjoint namespace on disk. A session touches the records it
//! reads or writes; [`TransformCache::dispose`] evicts everything else.

#![warn(missing_docs)]

pub mod artifact;
pub mod cache;
pub mod error;
pub mod manifest;
pub mod record;

pub use cache::{DisposeStats, TransformCache};
pub use error::CacheError;
pub use record::{fingerprint, CacheRecord};
