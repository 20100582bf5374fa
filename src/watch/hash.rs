// src/watch/hash.rs

//! Content hashes for `use_hash`: a change event only triggers when the
//! file's bytes differ from the last time it was seen. Hashes live in
//! memory for the lifetime of the watcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::fs::FileSystem;

/// Hex-encoded blake3 hash of a file's contents.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let bytes = fs.read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[derive(Debug, Default)]
pub struct ContentHashes {
    map: HashMap<PathBuf, String>,
}

impl ContentHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current hash of `path` and report whether it changed.
    ///
    /// Files that cannot be read count as changed.
    pub fn changed(&mut self, fs: &dyn FileSystem, path: &Path) -> bool {
        let hash = match compute_file_hash(fs, path) {
            Ok(h) => h,
            Err(err) => {
                warn!(file = ?path, error = %err, "failed to hash file; treating as changed");
                self.map.remove(path);
                return true;
            }
        };

        if self.map.get(path) == Some(&hash) {
            debug!(file = ?path, "content unchanged");
            return false;
        }
        self.map.insert(path.to_path_buf(), hash);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn identical_content_is_not_a_change() {
        let fs = MockFileSystem::new();
        let path = Path::new("src/js/main.js");
        fs.add_file(path, "let a = 1;");

        let mut hashes = ContentHashes::new();
        assert!(hashes.changed(&fs, path));
        assert!(!hashes.changed(&fs, path));

        fs.add_file(path, "let a = 2;");
        assert!(hashes.changed(&fs, path));
    }

    #[test]
    fn unreadable_file_counts_as_changed() {
        let fs = MockFileSystem::new();
        let mut hashes = ContentHashes::new();
        assert!(hashes.changed(&fs, Path::new("missing.js")));
        assert!(hashes.changed(&fs, Path::new("missing.js")));
    }
}
