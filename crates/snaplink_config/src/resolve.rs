//! Path resolution: turning config-relative paths into concrete ones.

use crate::types::SnaplinkConfig;
use std::path::{Path, PathBuf};

/// Paths of a configuration resolved against its project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Directory module keys are relative to.
    pub base_dir: PathBuf,
    /// Entry file.
    pub main: PathBuf,
    /// Output script.
    pub output: PathBuf,
    /// Sidecar listing the embedded files.
    pub files_list: PathBuf,
    /// Transform cache root.
    pub cache_dir: PathBuf,
    /// Auxiliary data file, if configured.
    pub auxiliary_data: Option<PathBuf>,
}

/// Resolves the configured paths.
///
/// `base_dir`, `output`, `cache.dir` and `auxiliary_data` are relative to
/// `project_dir`; `main` is relative to `base_dir`. Absolute paths are kept.
pub fn resolve_paths(config: &SnaplinkConfig, project_dir: &Path) -> ResolvedPaths {
    let base_dir = project_dir.join(&config.snapshot.base_dir);
    let output = project_dir.join(&config.snapshot.output);
    ResolvedPaths {
        main: base_dir.join(&config.snapshot.main),
        files_list: files_list_path(&output),
        output,
        cache_dir: project_dir.join(&config.cache.dir),
        auxiliary_data: config
            .snapshot
            .auxiliary_data
            .as_ref()
            .map(|p| project_dir.join(p)),
        base_dir,
    }
}

/// `<output>.files.json` next to the output script.
pub fn files_list_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".files.json");
    PathBuf::from(name)
}
