//! Locating the project and loading its configuration.

use std::path::{Path, PathBuf};

use snaplink_config::{SnaplinkConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// A loaded project: its directory and parsed configuration.
pub struct Project {
    /// Directory holding the configuration file; config paths are relative to it.
    pub root: PathBuf,
    /// The parsed configuration.
    pub config: SnaplinkConfig,
}

/// Walks up from `start` looking for the nearest directory containing `snaplink.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Loads the project selected by the global args.
///
/// `--config` may name a file or a directory containing `snaplink.toml`;
/// otherwise the current directory and its parents are searched.
pub fn load_project(global: &GlobalArgs) -> Result<Project, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let config_file = match &global.config {
        Some(path) => {
            let p = cwd.join(path);
            if p.is_dir() {
                p.join(CONFIG_FILE)
            } else {
                p
            }
        }
        None => find_project_root(&cwd)?.join(CONFIG_FILE),
    };

    let config = snaplink_config::load_config_file(&config_file)
        .map_err(|e| format!("{}: {e}", config_file.display()))?;
    let root = config_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(cwd);
    Ok(Project { root, config })
}
