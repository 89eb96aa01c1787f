//! Caller-supplied policy hooks consulted during a walk.

use std::path::Path;

/// Error type returned by hooks. The walker reports it unchanged.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Identity of a module handed to the exclusion and transpile hooks.
#[derive(Debug, Clone, Copy)]
pub struct ModuleRequest<'a> {
    /// Absolute path of the module being required.
    pub required_module_path: &'a Path,
    /// Absolute path of the requiring module; `None` for the entry file.
    pub requiring_module_path: Option<&'a Path>,
    /// The specifier as written in the requiring module.
    pub specifier: Option<&'a str>,
    /// Module key of the required module.
    pub relative_path: &'a str,
}

/// Decides which resolved modules are left to the host's loader.
pub trait ExclusionPolicy {
    /// Returns `true` if the module must not be embedded.
    fn is_excluded(&self, request: &ModuleRequest<'_>) -> bool;
}

impl<F> ExclusionPolicy for F
where
    F: Fn(&ModuleRequest<'_>) -> bool,
{
    fn is_excluded(&self, request: &ModuleRequest<'_>) -> bool {
        self(request)
    }
}

/// Embeds every resolvable module.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExclusions;

impl ExclusionPolicy for NoExclusions {
    fn is_excluded(&self, _request: &ModuleRequest<'_>) -> bool {
        false
    }
}

/// Replacement code produced by a [`Transpiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOutput {
    /// Code to embed instead of the original source.
    pub code: String,
    /// Source map (v3 JSON) from `code` back to the original source.
    pub source_map: Option<String>,
}

impl TranspileOutput {
    /// Replacement code without a source map.
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            source_map: None,
        }
    }
}

/// Source-to-source transformation invoked once per file on a cache miss.
pub trait Transpiler {
    /// Returns replacement code for `source`, or `None` to embed it as is.
    fn transpile(
        &self,
        request: &ModuleRequest<'_>,
        source: &str,
    ) -> Result<Option<TranspileOutput>, HookError>;
}

impl<F> Transpiler for F
where
    F: Fn(&ModuleRequest<'_>, &str) -> Result<Option<TranspileOutput>, HookError>,
{
    fn transpile(
        &self,
        request: &ModuleRequest<'_>,
        source: &str,
    ) -> Result<Option<TranspileOutput>, HookError> {
        self(request, source)
    }
}
