//! Error types for script assembly and generation.

use snaplink_graph::GraphError;

/// Errors raised while decoding a v3 source map.
#[derive(Debug, thiserror::Error)]
pub enum SourceMapError {
    /// The map is not valid JSON or lacks required fields.
    #[error("invalid source map JSON: {0}")]
    Json(String),

    /// Only version 3 maps are understood.
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),

    /// A character outside the base64 alphabet appeared in `mappings`.
    #[error("invalid base64 character `{ch}` in mappings at line {line}")]
    InvalidBase64 {
        /// The offending character.
        ch: char,
        /// Generated line (0-based) the character belongs to.
        line: usize,
    },

    /// A VLQ value ended mid-number or a segment had the wrong field count.
    #[error("malformed mapping segment at line {line}: {reason}")]
    MalformedSegment {
        /// Generated line (0-based) of the segment.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

/// ES module syntax that cannot be rewritten into the loader's form.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct ModuleSyntaxError {
    /// Line (0-based) of the offending token.
    pub line: usize,
    /// What could not be rewritten.
    pub reason: String,
}

/// Errors raised while rendering the snapshot script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Auxiliary data must be a JSON object or null.
    #[error("auxiliary data must be an object or null, got {found}")]
    AuxiliaryData {
        /// JSON type of the supplied value.
        found: &'static str,
    },

    /// The entry module is not among the modules to embed.
    #[error("entry module `{key}` is not embedded")]
    MissingEntry {
        /// Module key of the entry.
        key: String,
    },

    /// A module's source map could not be decoded.
    #[error("invalid source map for `{key}`: {source}")]
    SourceMap {
        /// Module key the map belongs to.
        key: String,
        /// The decoding error.
        source: SourceMapError,
    },

    /// A module uses `import`/`export` syntax that cannot be lowered.
    #[error("cannot lower module syntax in `{key}`: {source}")]
    ModuleSyntax {
        /// Module key of the offending module.
        key: String,
        /// The lowering error.
        source: ModuleSyntaxError,
    },

    /// A row table is unsorted, overlapping or otherwise inconsistent.
    #[error("invalid row index: {0}")]
    InvalidRowIndex(String),

    /// A value could not be rendered as a JSON literal.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by [`generate_snapshot_script`](crate::generate_snapshot_script).
///
/// Every layer's error is carried unchanged; no partial artifact is produced.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// Traversal, resolution, transform or cache failure.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Rendering failure.
    #[error(transparent)]
    Script(#[from] ScriptError),
}
