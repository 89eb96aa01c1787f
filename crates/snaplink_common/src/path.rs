//! Lexical path helpers.
//!
//! Module keys must be stable across machines that check the same project out
//! at different locations, so they are always derived lexically from the
//! generation's base directory and never from canonicalized (symlink-resolved)
//! paths.

use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path: drops `.` components and folds `..` into
/// the preceding normal component.
///
/// A leading `..` on a relative path is kept, since there is nothing to fold
/// it into.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns the module key of `path` relative to `base_dir`.
///
/// Keys use `/` separators on every platform. Keys of files below the base
/// directory start with `./`; keys of files outside it start with `../`.
///
/// ```
/// use std::path::Path;
/// use snaplink_common::module_key;
///
/// let key = module_key(Path::new("/p/test"), Path::new("/p/fixtures/a.js"));
/// assert_eq!(key, "../fixtures/a.js");
/// ```
pub fn module_key(base_dir: &Path, path: &Path) -> String {
    let base = normalize_path(base_dir);
    let target = normalize_path(path);

    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();
    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    for _ in common..base_parts.len() {
        segments.push("..".to_string());
    }
    for part in &target_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }

    let joined = segments.join("/");
    if segments.first().map(String::as_str) == Some("..") {
        joined
    } else {
        format!("./{joined}")
    }
}
