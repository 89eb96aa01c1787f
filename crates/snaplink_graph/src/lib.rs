//! Module graph traversal for snapshot generation.
//!
//! Resolves import specifiers the way the host runtime does, scans module
//! source for specifiers without executing it, and walks the graph from an
//! entry file in depth-first pre-order, consulting the transform cache so
//! that unchanged files are never re-transformed.

#![warn(missing_docs)]

pub mod error;
pub mod hooks;
pub mod resolver;
pub mod scan;
pub mod walker;

pub use error::{GraphError, ResolveError};
pub use hooks::{
    ExclusionPolicy, HookError, ModuleRequest, NoExclusions, TranspileOutput, Transpiler,
};
pub use resolver::{ModuleResolver, Resolved};
pub use scan::{scan_specifiers, tokenize, Spanned, Token};
pub use walker::{Dependency, DependencyTarget, GraphWalker, ModuleNode, WalkOutput};
