//! The `[exclude]` table as an exclusion policy.

use snaplink_graph::{ExclusionPolicy, ModuleRequest};

use crate::types::ExcludeConfig;

impl ExcludeConfig {
    /// Name of the innermost `node_modules` package containing `module_key`.
    fn package_of(module_key: &str) -> Option<String> {
        let segments: Vec<&str> = module_key.split('/').collect();
        let at = segments.iter().rposition(|s| *s == "node_modules")?;
        let name = segments.get(at + 1)?;
        if name.starts_with('@') {
            let inner = segments.get(at + 2)?;
            Some(format!("{name}/{inner}"))
        } else {
            Some((*name).to_string())
        }
    }
}

impl ExclusionPolicy for ExcludeConfig {
    fn is_excluded(&self, request: &ModuleRequest<'_>) -> bool {
        let key = request.relative_path;
        if self.suffixes.iter().any(|s| key.ends_with(s.as_str())) {
            return true;
        }
        if self.packages.is_empty() {
            return false;
        }
        Self::package_of(key).is_some_and(|pkg| self.packages.iter().any(|p| *p == pkg))
    }
}
