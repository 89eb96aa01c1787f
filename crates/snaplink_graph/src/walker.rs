//! Depth-first module graph traversal.
//!
//! The walker visits each reachable module exactly once, in pre-order from
//! the entry file. Traversal uses an explicit stack, so deep or cyclic
//! graphs never recurse. For every newly visited file it either reuses the
//! cached transform record or transforms the file and stores a new record,
//! then follows the record's specifiers.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use snaplink_cache::{CacheRecord, TransformCache};
use snaplink_common::{module_key, normalize_path};

use crate::error::GraphError;
use crate::hooks::{ExclusionPolicy, ModuleRequest, Transpiler};
use crate::resolver::{ModuleResolver, Resolved};
use crate::scan::scan_specifiers;

/// Where a dependency is served from at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyTarget {
    /// Embedded in the snapshot under this module key.
    Embedded(String),
    /// Loaded by the host: an excluded file (module key) or a builtin (name).
    Delegated(String),
}

impl DependencyTarget {
    /// The key the generated loader uses for this dependency.
    pub fn key(&self) -> &str {
        match self {
            DependencyTarget::Embedded(key) | DependencyTarget::Delegated(key) => key,
        }
    }
}

/// One specifier of a module and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The specifier as written.
    pub specifier: String,
    /// The resolved target.
    pub target: DependencyTarget,
}

/// A module selected for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Module key: path relative to the base directory, `/`-separated.
    pub relative_path: String,
    /// Code to embed.
    pub transformed_code: String,
    /// Source map from `transformed_code` back to the original file.
    pub source_map: Option<String>,
    /// Position in visit order, starting at 0 for the entry file.
    pub visit_order: usize,
    /// Resolved specifiers, in the order they were found.
    pub dependencies: Vec<Dependency>,
}

/// Result of a walk.
#[derive(Debug, Clone)]
pub struct WalkOutput {
    /// Embedded modules in visit order.
    pub modules: Vec<ModuleNode>,
    /// Absolute paths of the embedded modules in visit order, entry first.
    pub included_file_paths: IndexSet<PathBuf>,
}

/// A file waiting on the traversal stack together with how it was reached.
struct Pending {
    path: PathBuf,
    requester: Option<PathBuf>,
    specifier: Option<String>,
}

/// Walks the module graph of one generation.
pub struct GraphWalker<'a> {
    cache: &'a mut TransformCache,
    resolver: ModuleResolver,
    base_dir: PathBuf,
    exclusion: &'a dyn ExclusionPolicy,
    transpiler: Option<&'a dyn Transpiler>,
}

impl<'a> GraphWalker<'a> {
    /// Creates a walker that derives module keys from `base_dir`.
    ///
    /// A relative `base_dir` is taken relative to the current directory, so
    /// module paths in the output are always absolute.
    pub fn new(
        cache: &'a mut TransformCache,
        base_dir: &Path,
        exclusion: &'a dyn ExclusionPolicy,
        transpiler: Option<&'a dyn Transpiler>,
    ) -> Self {
        Self {
            cache,
            resolver: ModuleResolver::new(),
            base_dir: normalize_path(
                &std::path::absolute(base_dir).unwrap_or_else(|_| base_dir.to_path_buf()),
            ),
            exclusion,
            transpiler,
        }
    }

    /// Walks the graph reachable from `entry`.
    ///
    /// A relative `entry` is taken relative to the base directory.
    pub fn walk(mut self, entry: &Path) -> Result<WalkOutput, GraphError> {
        let entry = if entry.is_absolute() {
            normalize_path(entry)
        } else {
            normalize_path(&self.base_dir.join(entry))
        };

        let mut modules = Vec::new();
        let mut included = IndexSet::new();
        let mut stack = vec![Pending {
            path: entry,
            requester: None,
            specifier: None,
        }];

        while let Some(pending) = stack.pop() {
            if included.contains(&pending.path) {
                continue;
            }
            included.insert(pending.path.clone());

            let (node, children) = self.visit(pending, modules.len())?;
            modules.push(node);
            // Reversed so the first specifier is popped first.
            stack.extend(children.into_iter().rev());
        }

        log::info!(
            "walked {} module(s) from {}",
            modules.len(),
            self.base_dir.display()
        );
        Ok(WalkOutput {
            modules,
            included_file_paths: included,
        })
    }

    /// Loads or computes the record for one file and resolves its specifiers.
    fn visit(
        &mut self,
        pending: Pending,
        visit_order: usize,
    ) -> Result<(ModuleNode, Vec<Pending>), GraphError> {
        let path = pending.path;
        let relative_path = module_key(&self.base_dir, &path);

        let original = std::fs::read_to_string(&path).map_err(|e| GraphError::Io {
            path: path.clone(),
            source: e,
        })?;

        let record = match self.cache.get(&path, &original)? {
            Some(record) => {
                log::debug!("cache hit: {relative_path}");
                record
            }
            None => {
                log::debug!("cache miss: {relative_path}");
                let request = ModuleRequest {
                    required_module_path: &path,
                    requiring_module_path: pending.requester.as_deref(),
                    specifier: pending.specifier.as_deref(),
                    relative_path: &relative_path,
                };
                let record = self.transform(&request, &original)?;
                self.cache.put(&record)?;
                record
            }
        };

        let from_dir = path.parent().unwrap_or(Path::new("/"));
        let mut dependencies = Vec::with_capacity(record.requires.len());
        let mut children = Vec::new();

        for specifier in &record.requires {
            let resolved = self
                .resolver
                .resolve(from_dir, specifier)
                .map_err(|e| e.with_requester(path.clone()))?;

            let target = match resolved {
                Resolved::Builtin(name) => DependencyTarget::Delegated(name),
                Resolved::File(target_path) => {
                    let key = module_key(&self.base_dir, &target_path);
                    let request = ModuleRequest {
                        required_module_path: &target_path,
                        requiring_module_path: Some(&path),
                        specifier: Some(specifier),
                        relative_path: &key,
                    };
                    if self.exclusion.is_excluded(&request) {
                        log::debug!("excluded: {key}");
                        DependencyTarget::Delegated(key)
                    } else {
                        children.push(Pending {
                            path: target_path,
                            requester: Some(path.clone()),
                            specifier: Some(specifier.clone()),
                        });
                        DependencyTarget::Embedded(key)
                    }
                }
            };
            dependencies.push(Dependency {
                specifier: specifier.clone(),
                target,
            });
        }

        let node = ModuleNode {
            path,
            relative_path,
            transformed_code: record.transformed,
            source_map: record.source_map,
            visit_order,
            dependencies,
        };
        Ok((node, children))
    }

    /// Produces a fresh record on a cache miss.
    fn transform(
        &self,
        request: &ModuleRequest<'_>,
        original: &str,
    ) -> Result<CacheRecord, GraphError> {
        let path = request.required_module_path;

        if is_json(path) {
            return Ok(CacheRecord {
                path: path.to_path_buf(),
                original: original.to_string(),
                transformed: format!("module.exports = {original}"),
                requires: Vec::new(),
                source_map: None,
            });
        }

        let output = match self.transpiler {
            Some(transpiler) => {
                transpiler
                    .transpile(request, original)
                    .map_err(|source| GraphError::Transform {
                        path: path.to_path_buf(),
                        source,
                    })?
            }
            None => None,
        };
        let (transformed, source_map) = match output {
            Some(out) => (out.code, out.source_map),
            None => (original.to_string(), None),
        };

        Ok(CacheRecord {
            path: path.to_path_buf(),
            original: original.to_string(),
            requires: scan_specifiers(&transformed),
            transformed,
            source_map,
        })
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}
