//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::SnaplinkConfig;
use std::path::Path;

/// File name looked up in a project directory.
pub const CONFIG_FILE: &str = "snaplink.toml";

/// Loads and validates `snaplink.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<SnaplinkConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<SnaplinkConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<SnaplinkConfig, ConfigError> {
    let config: SnaplinkConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and values are usable.
fn validate_config(config: &SnaplinkConfig) -> Result<(), ConfigError> {
    if config.snapshot.main.trim().is_empty() {
        return Err(ConfigError::MissingField("snapshot.main".to_string()));
    }
    if config.cache.invalidation_key.is_empty() {
        return Err(ConfigError::MissingField("cache.invalidation_key".to_string()));
    }
    if config.snapshot.output.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "snapshot.output must not be empty".to_string(),
        ));
    }
    if config.exclude.suffixes.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::ValidationError(
            "exclude.suffixes must not contain empty strings".to_string(),
        ));
    }
    for package in &config.exclude.packages {
        let valid = match package.strip_prefix('@') {
            Some(scoped) => matches!(scoped.split_once('/'), Some((s, n)) if !s.is_empty() && !n.is_empty() && !n.contains('/')),
            None => !package.is_empty() && !package.contains('/'),
        };
        if !valid {
            return Err(ConfigError::ValidationError(format!(
                "invalid package name in exclude.packages: '{package}'"
            )));
        }
    }
    Ok(())
}
