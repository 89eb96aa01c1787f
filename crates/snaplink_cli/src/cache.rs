//! `snaplink cache`: transform cache introspection.

use snaplink_cache::TransformCache;
use snaplink_config::resolve_paths;

use crate::project::load_project;
use crate::{CacheCommand, GlobalArgs};

/// Runs a `snaplink cache` subcommand.
pub fn run(command: &CacheCommand, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let paths = resolve_paths(&project.config, &project.root);

    match command {
        CacheCommand::Keys => {
            // Not disposed: listing keys must not evict anything.
            let cache = TransformCache::load_or_create(
                &paths.cache_dir,
                &project.config.cache.invalidation_key,
            )?;
            if !global.quiet {
                eprintln!("   Namespace {}", cache.namespace_dir().display());
            }
            for key in cache.persisted_keys() {
                println!("{key}");
            }
        }
    }
    Ok(0)
}
