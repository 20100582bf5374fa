// src/pipeline/asset.rs

use std::path::{Path, PathBuf};

/// One file flowing through a pipeline.
///
/// `path` is relative to the pipeline's source root on the way in and
/// relative to its destination directory on the way out; transforms may
/// rename it. `source` keeps the original relative path for diagnostics
/// and source maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: PathBuf,
    pub source: PathBuf,
    pub content: Vec<u8>,
    pub source_map: Option<Vec<u8>>,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            path,
            content: content.into(),
            source_map: None,
        }
    }

    /// Content as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// File name of the current output path, for messages.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }
}
