//! One-call snapshot generation.

use std::path::PathBuf;

use indexmap::IndexSet;
use serde_json::Value;
use snaplink_cache::TransformCache;
use snaplink_graph::{ExclusionPolicy, GraphWalker, NoExclusions, Transpiler};

use crate::assembler::{host_platform, AssemblerOptions, ScriptAssembler};
use crate::error::GenerateError;
use crate::row_index::RowIndex;

/// Inputs of one generation.
pub struct GenerateOptions<'a> {
    /// Directory module keys are relative to.
    pub base_dir_path: PathBuf,
    /// Entry file; a relative path is taken relative to `base_dir_path`.
    pub main_path: PathBuf,
    /// Decides which dependencies are left to the host.
    pub exclusion: &'a dyn ExclusionPolicy,
    /// Transform applied to every file on a cache miss.
    pub transpiler: Option<&'a dyn Transpiler>,
    /// Data exposed as `snapshotAuxiliaryData`; an object or null.
    pub auxiliary_data: Value,
    /// `process.platform` at build time.
    pub platform: String,
}

impl<'a> GenerateOptions<'a> {
    /// Options that embed everything reachable from `main_path` untransformed.
    pub fn new(base_dir_path: impl Into<PathBuf>, main_path: impl Into<PathBuf>) -> Self {
        Self {
            base_dir_path: base_dir_path.into(),
            main_path: main_path.into(),
            exclusion: &NoExclusions,
            transpiler: None,
            auxiliary_data: Value::Null,
            platform: host_platform().to_string(),
        }
    }

    /// Sets the exclusion policy.
    pub fn exclusion(mut self, exclusion: &'a dyn ExclusionPolicy) -> Self {
        self.exclusion = exclusion;
        self
    }

    /// Sets the transpile hook.
    pub fn transpiler(mut self, transpiler: &'a dyn Transpiler) -> Self {
        self.transpiler = Some(transpiler);
        self
    }

    /// Sets the auxiliary data.
    pub fn auxiliary_data(mut self, data: Value) -> Self {
        self.auxiliary_data = data;
        self
    }

    /// Overrides the build-time platform name.
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}

/// Output of one generation.
#[derive(Debug, Clone)]
pub struct SnapshotArtifact {
    /// The assembled script.
    pub snapshot_script: String,
    /// Row translation table of `snapshot_script`.
    pub row_index: RowIndex,
    /// Embedded files in visit order, entry first.
    pub included_file_paths: IndexSet<PathBuf>,
}

/// Walks the graph from `options.main_path` and assembles the snapshot
/// script.
///
/// The cache is only read and written; disposing it is up to the caller.
/// Any failure aborts the whole generation.
pub fn generate_snapshot_script(
    cache: &mut TransformCache,
    options: GenerateOptions<'_>,
) -> Result<SnapshotArtifact, GenerateError> {
    let walk = GraphWalker::new(
        cache,
        &options.base_dir_path,
        options.exclusion,
        options.transpiler,
    )
    .walk(&options.main_path)?;

    let main_key = walk
        .modules
        .first()
        .map(|m| m.relative_path.clone())
        .unwrap_or_default();

    let assembler_options = AssemblerOptions {
        platform: options.platform,
        auxiliary_data: options.auxiliary_data,
    };
    let (snapshot_script, row_index) =
        ScriptAssembler::new(&assembler_options).assemble(&walk.modules, &main_key)?;

    log::info!(
        "generated snapshot script: {} module(s), {} byte(s)",
        walk.modules.len(),
        snapshot_script.len()
    );
    Ok(SnapshotArtifact {
        snapshot_script,
        row_index,
        included_file_paths: walk.included_file_paths,
    })
}
