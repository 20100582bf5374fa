// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem for pipeline tests.
///
/// Paths are used verbatim as keys; tests should stick to one spelling
/// (e.g. always relative like `src/js/main.js`).
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    /// Paths under which every write fails.
    read_only: Arc<Mutex<Vec<PathBuf>>>,
    writes: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            read_only: Arc::new(Mutex::new(Vec::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.lock_files();
        files.insert(path.clone(), MockEntry::File(content.into()));

        if let Some(parent) = non_empty_parent(&path) {
            Self::ensure_dir_entry(&mut files, parent);
            Self::link_child(&mut files, parent, &path);
        }
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.lock_files();
        Self::ensure_dir_entry(&mut files, path.as_ref());
    }

    /// Make every write at or below `path` fail.
    pub fn deny_writes_under(&self, path: impl AsRef<Path>) {
        let mut guard = self.read_only.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(path.as_ref().to_path_buf());
    }

    /// Contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock_files().get(path.as_ref()) {
            Some(MockEntry::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// Every path written through [`FileSystem::write`], in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_files(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        if let Some(parent) = non_empty_parent(path) {
            if parent != path {
                Self::ensure_dir_entry(files, parent);
                Self::link_child(files, parent, path);
            }
        }
    }

    fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        Some(Path::new("."))
    } else {
        Some(parent)
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match self.lock_files().get(path) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let denied = self
            .read_only
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|p| path.starts_with(p));
        if denied {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        self.add_file(path, contents);
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_path_buf());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let denied = self
            .read_only
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|p| path.starts_with(p));
        if denied {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        self.add_dir(path);
        Ok(())
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock_files().get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock_files().get(path), Some(MockEntry::Dir(_)))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lock_files().get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_files_are_listed_through_parents() {
        let fs = MockFileSystem::new();
        fs.add_file("src/js/main.js", b"let a = 1;".to_vec());

        assert!(fs.is_dir(Path::new("src")));
        assert!(fs.is_dir(Path::new("src/js")));
        assert_eq!(
            fs.read_dir(Path::new("src")).unwrap(),
            vec![PathBuf::from("src/js")]
        );
        assert_eq!(fs.read(Path::new("src/js/main.js")).unwrap(), b"let a = 1;");
    }

    #[test]
    fn denied_writes_fail() {
        let fs = MockFileSystem::new();
        fs.deny_writes_under("dist");
        assert!(fs.write(Path::new("dist/a.css"), b"a").is_err());
        assert!(fs.write(Path::new("out/a.css"), b"a").is_ok());
        assert_eq!(fs.writes(), vec![PathBuf::from("out/a.css")]);
    }
}
