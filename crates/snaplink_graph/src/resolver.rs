//! Module resolution for require and import specifiers.
//!
//! Follows the host runtime's lookup order so that the file embedded for a
//! specifier is the file the host would have loaded at run time:
//!
//! 1. builtin host modules are never files;
//! 2. relative and absolute specifiers are resolved against the requesting
//!    directory;
//! 3. bare specifiers are looked up in `node_modules` of the requesting
//!    directory and then of each ancestor.
//!
//! Every candidate path is tried as a file (exact, then with an extension
//! appended) and then as a directory (`package.json` `main`, then `index`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use snaplink_common::normalize_path;

use crate::error::ResolveError;

/// Extensions tried, in order, when a specifier names no existing file.
const EXTENSIONS: [&str; 4] = ["js", "json", "mjs", "cjs"];

/// Host modules that are always provided by the runtime.
const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// The target a specifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    /// A file on disk (absolute, lexically normalized).
    File(PathBuf),
    /// A builtin host module, identified by its specifier.
    Builtin(String),
}

/// The fields of a package descriptor that matter for resolution.
#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    main: Option<String>,
}

/// Stateless resolver; every call reads the filesystem afresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleResolver;

impl ModuleResolver {
    /// Creates a resolver.
    pub fn new() -> Self {
        Self
    }

    /// Resolves `specifier` as required from a module in `from_dir`.
    pub fn resolve(&self, from_dir: &Path, specifier: &str) -> Result<Resolved, ResolveError> {
        if is_builtin(specifier) {
            return Ok(Resolved::Builtin(specifier.to_string()));
        }

        let found = if is_path_like(specifier) {
            let target = if Path::new(specifier).is_absolute() {
                PathBuf::from(specifier)
            } else {
                from_dir.join(specifier)
            };
            self.resolve_path(&normalize_path(&target))?
        } else {
            self.resolve_package(from_dir, specifier)?
        };

        found.map(Resolved::File).ok_or_else(|| ResolveError::NotFound {
            requester: from_dir.to_path_buf(),
            specifier: specifier.to_string(),
        })
    }

    /// Searches `node_modules` directories from `from_dir` upwards.
    fn resolve_package(
        &self,
        from_dir: &Path,
        specifier: &str,
    ) -> Result<Option<PathBuf>, ResolveError> {
        for dir in from_dir.ancestors() {
            if dir.file_name().is_some_and(|name| name == "node_modules") {
                continue;
            }
            let candidate = normalize_path(&dir.join("node_modules").join(specifier));
            if let Some(found) = self.resolve_path(&candidate)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Tries `candidate` as a file, then as a directory.
    fn resolve_path(&self, candidate: &Path) -> Result<Option<PathBuf>, ResolveError> {
        if let Some(file) = as_file(candidate) {
            return Ok(Some(file));
        }
        self.as_directory(candidate)
    }

    /// Resolves a directory through its package descriptor, then its index.
    fn as_directory(&self, dir: &Path) -> Result<Option<PathBuf>, ResolveError> {
        if !dir.is_dir() {
            return Ok(None);
        }

        let descriptor = dir.join("package.json");
        if descriptor.is_file() {
            if let Some(main) = read_main(&descriptor)? {
                let entry = normalize_path(&dir.join(main));
                if let Some(found) = as_file(&entry).or_else(|| as_index(&entry)) {
                    return Ok(Some(found));
                }
            }
        }

        Ok(as_index(dir))
    }
}

/// Returns `true` for specifiers the host provides itself.
pub fn is_builtin(specifier: &str) -> bool {
    specifier.starts_with("node:") || BUILTIN_MODULES.contains(&specifier)
}

/// Returns `true` for relative or absolute specifiers.
fn is_path_like(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

/// Exact file, then file with each known extension appended.
fn as_file(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    EXTENSIONS
        .iter()
        .map(|ext| with_appended_extension(candidate, ext))
        .find(|p| p.is_file())
}

/// `index` file with each known extension inside `dir`.
fn as_index(dir: &Path) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index.{ext}")))
        .find(|p| p.is_file())
}

/// Appends `.ext` to the full file name (`a.b` becomes `a.b.js`, not `a.js`).
fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Reads the non-empty `main` field of a package descriptor.
fn read_main(descriptor: &Path) -> Result<Option<String>, ResolveError> {
    let content = std::fs::read_to_string(descriptor).map_err(|e| ResolveError::PackageJson {
        path: descriptor.to_path_buf(),
        reason: e.to_string(),
    })?;
    let package: PackageJson =
        serde_json::from_str(&content).map_err(|e| ResolveError::PackageJson {
            path: descriptor.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(package.main.filter(|m| !m.trim().is_empty()))
}
