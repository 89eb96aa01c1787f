//! `snaplink generate`: assemble and write the snapshot script.
//!
//! Steps:
//! 1. Load `snaplink.toml` and resolve its paths
//! 2. Read the auxiliary data file, if any
//! 3. Open the transform cache namespace for the invalidation key
//! 4. Generate the script with the `[exclude]` policy
//! 5. Dispose the cache, then write the script and `<output>.files.json`
//!
//! A failed generation leaves the cache undisposed, so records written so far
//! stay unreferenced and the previous manifest is kept.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use snaplink_cache::TransformCache;
use snaplink_config::{files_list_path, resolve_paths};
use snaplink_script::{generate_snapshot_script, GenerateOptions, SnapshotArtifact};

use crate::project::load_project;
use crate::{GenerateArgs, GlobalArgs};

/// Runs the `snaplink generate` command.
pub fn run(args: &GenerateArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let config = &project.config;
    let paths = resolve_paths(config, &project.root);
    let output = match &args.output {
        Some(path) => std::env::current_dir()?.join(path),
        None => paths.output.clone(),
    };

    let auxiliary_data = match &paths.auxiliary_data {
        Some(path) => read_auxiliary_data(path)?,
        None => Value::Null,
    };

    let mut cache = TransformCache::load_or_create(&paths.cache_dir, &config.cache.invalidation_key)?;
    let mut options = GenerateOptions::new(&paths.base_dir, &paths.main)
        .exclusion(&config.exclude)
        .auxiliary_data(auxiliary_data);
    if let Some(platform) = &config.snapshot.platform {
        options = options.platform(platform.clone());
    }

    let artifact = generate_snapshot_script(&mut cache, options)?;
    let stats = cache.dispose()?;
    log::info!(
        "transform cache: kept {}, evicted {}",
        stats.kept,
        stats.evicted
    );

    write_outputs(&artifact, &output)?;

    if global.verbose {
        for path in &artifact.included_file_paths {
            eprintln!("    Embedded {}", path.display());
        }
    }
    if !global.quiet {
        eprintln!(
            "   Generated {} ({} module(s))",
            output.display(),
            artifact.included_file_paths.len()
        );
    }
    Ok(0)
}

/// Reads the auxiliary data file, which must hold a JSON object or null.
fn read_auxiliary_data(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("failed to read auxiliary data {}: {e}", path.display()))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| format!("invalid auxiliary data {}: {e}", path.display()))?;
    Ok(value)
}

/// Writes the script and the list of embedded files next to it.
fn write_outputs(artifact: &SnapshotArtifact, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &artifact.snapshot_script)?;

    let files: Vec<&PathBuf> = artifact.included_file_paths.iter().collect();
    let mut listing = serde_json::to_string_pretty(&files)?;
    listing.push('\n');
    fs::write(files_list_path(output), listing)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use snaplink_config::CONFIG_FILE;

    fn project(root: &Path, extra: &str) {
        fs::create_dir_all(root.join("src/node_modules/native")).unwrap();
        fs::write(
            root.join("src/index.js"),
            "require('./lib')\nrequire('native')\nglobal.ready = true\n",
        )
        .unwrap();
        fs::write(root.join("src/lib.js"), "module.exports = 1\n").unwrap();
        fs::write(
            root.join("src/node_modules/native/index.js"),
            "module.exports = process.dlopen\n",
        )
        .unwrap();
        fs::write(
            root.join(CONFIG_FILE),
            format!(
                "[snapshot]\nmain = \"index.js\"\nbase_dir = \"src\"\noutput = \"build/snapshot.js\"\n{extra}\n[cache]\ninvalidation_key = \"v1\"\n\n[exclude]\npackages = \"native\"\n"
            ),
        )
        .unwrap();
    }

    fn global(root: &Path) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(root.join(CONFIG_FILE).display().to_string()),
        }
    }

    #[test]
    fn writes_script_and_file_list() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        project(root, "");

        let code = run(&GenerateArgs { output: None }, &global(root)).unwrap();
        assert_eq!(code, 0);

        let script = fs::read_to_string(root.join("build/snapshot.js")).unwrap();
        assert!(script.contains("customRequire.define(\"./index.js\""));
        assert!(script.contains("customRequire.define(\"./lib.js\""));
        assert!(!script.contains("customRequire.define(\"./node_modules/native/index.js\""));
        assert!(script.contains("\"native\":\"./node_modules/native/index.js\""));

        let listing: Vec<PathBuf> = serde_json::from_str(
            &fs::read_to_string(root.join("build/snapshot.js.files.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            listing,
            vec![root.join("src/index.js"), root.join("src/lib.js")]
        );

        let cache = TransformCache::load_or_create(&root.join(".snaplink-cache"), "v1").unwrap();
        assert_eq!(cache.persisted_keys().len(), 2);
    }

    #[test]
    fn embeds_auxiliary_data_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        project(root, "auxiliary_data = \"aux.json\"\nplatform = \"win32\"");
        fs::write(root.join("aux.json"), "{\"build\": \"42\"}").unwrap();

        run(&GenerateArgs { output: None }, &global(root)).unwrap();
        let script = fs::read_to_string(root.join("build/snapshot.js")).unwrap();
        assert!(script.contains("var snapshotAuxiliaryData = {\"build\":\"42\",\"snapshotSections\":"));
        assert!(script.contains("platform: \"win32\""));
    }

    #[test]
    fn output_flag_overrides_config() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        project(root, "");
        let output = root.join("elsewhere/out.js");

        run(
            &GenerateArgs {
                output: Some(output.display().to_string()),
            },
            &global(root),
        )
        .unwrap();
        assert!(output.exists());
        assert!(root.join("elsewhere/out.js.files.json").exists());
        assert!(!root.join("build/snapshot.js").exists());
    }

    #[test]
    fn invalid_auxiliary_data_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        project(root, "auxiliary_data = \"aux.json\"");
        fs::write(root.join("aux.json"), "{not json").unwrap();

        let err = run(&GenerateArgs { output: None }, &global(root)).unwrap_err();
        assert!(err.to_string().contains("invalid auxiliary data"));
    }
}
