//! Shared foundational types used across the snaplink workspace.
//!
//! This crate provides content hashing for cache fingerprints and the path
//! helpers that derive stable module keys from absolute file paths.

#![warn(missing_docs)]

pub mod hash;
pub mod path;

pub use hash::{ContentHash, FingerprintBuilder};
pub use path::{module_key, normalize_path};
