//! Parsing and validation of `snaplink.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`SnaplinkConfig`], resolves its paths against the project directory, and
//! exposes the `[exclude]` table as an [`ExclusionPolicy`](snaplink_graph::ExclusionPolicy).

#![warn(missing_docs)]

mod exclude;
pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use resolve::{files_list_path, resolve_paths, ResolvedPaths};
pub use types::*;
