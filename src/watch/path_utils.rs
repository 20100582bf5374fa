// src/watch/path_utils.rs

//! Path helpers for the watcher. Watch patterns and ignore prefixes are
//! matched against root-relative strings with forward slashes.

use std::path::Path;

/// Convert `path` into a string relative to `root`, with forward slashes.
///
/// Tries a plain `strip_prefix` first, then retries with both sides
/// canonicalized (symlinked temp dirs, `/private/var` on macOS, ...).
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(to_slash(rel));
        }
    }

    None
}

fn to_slash(rel: &Path) -> String {
    rel.to_string_lossy()
        .replace('\\', "/")
        .trim_start_matches("./")
        .to_string()
}

/// Whether the relative path `rel` is `prefix` itself or lies below it.
pub fn is_under(rel: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    rel == prefix || (rel.starts_with(prefix) && rel.as_bytes().get(prefix.len()) == Some(&b'/'))
}
