//! `snaplink translate`: map a script row back to its original file.

use std::fs;
use std::path::PathBuf;

use snaplink_config::resolve_paths;
use snaplink_script::RowIndex;

use crate::project::load_project;
use crate::{GlobalArgs, TranslateArgs};

/// Runs the `snaplink translate` command.
///
/// Prints `{"relativePath": ..., "row": ...}`, the same value the script's
/// `translateSnapshotRow` returns.
pub fn run(args: &TranslateArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let script_path = match &args.script {
        Some(path) => PathBuf::from(path),
        None => {
            let project = load_project(global)?;
            resolve_paths(&project.config, &project.root).output
        }
    };

    let script = fs::read_to_string(&script_path)
        .map_err(|e| format!("failed to read {}: {e}", script_path.display()))?;
    let index = RowIndex::from_script(&script)?;
    println!("{}", serde_json::to_string(&index.translate(args.row))?);
    Ok(0)
}
