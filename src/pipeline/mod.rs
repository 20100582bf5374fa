// src/pipeline/mod.rs

//! Pipelines: read sources, apply transform steps, write outputs.
//!
//! A [`Pipeline`] is immutable once built and carries no run state; every
//! call to [`Pipeline::run`] re-enumerates its sources. All IO goes through
//! the [`FileSystem`] trait.

pub mod asset;
pub mod transform;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

use crate::config::model::PipelineConfig;
use crate::errors::{PipelineError, PipelineErrorKind, TransformError};
use crate::fs::FileSystem;
use crate::types::FailurePolicy;

pub use asset::Asset;
pub use transform::{Transform, TransformFuture, build_transform};

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub pipeline: String,
    /// Files that made it to the destination (written or already up to date).
    pub files: usize,
    /// Files whose destination bytes actually changed.
    pub written: usize,
    /// Per-file failures absorbed under `log-and-continue`.
    pub warnings: Vec<TransformError>,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// What happened to one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Written,
    Unchanged,
}

/// A named source -> transforms -> destination unit.
pub struct Pipeline {
    name: String,
    root: PathBuf,
    sources: GlobSet,
    dest: PathBuf,
    policy: FailurePolicy,
    steps: Vec<Arc<dyn Transform>>,
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("dest", &self.dest)
            .field("policy", &self.policy)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        patterns: &[String],
        dest: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
    ) -> anyhow::Result<Self> {
        let name = name.into();
        let sources = build_globset(patterns)
            .with_context(|| format!("building source globset for pipeline {name}"))?;
        Ok(Self {
            name,
            root: root.into(),
            sources,
            dest: dest.into(),
            policy: FailurePolicy::default(),
            steps: Vec::new(),
            fs,
        })
    }

    /// Build a pipeline from its `[pipeline.<name>]` section.
    pub fn from_config(
        name: &str,
        cfg: &PipelineConfig,
        fs: Arc<dyn FileSystem>,
    ) -> anyhow::Result<Self> {
        let steps = cfg.steps.iter().map(build_transform).collect();
        Ok(Self::new(name, &cfg.root, &cfg.src, &cfg.dest, fs)?
            .with_policy(cfg.policy)
            .with_steps(steps))
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_steps(mut self, steps: Vec<Arc<dyn Transform>>) -> Self {
        self.steps = steps;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run the pipeline once over every matching source file.
    ///
    /// Files are processed in lexicographic order of their root-relative
    /// path. A file's steps apply strictly in declaration order.
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let sources = self.collect_sources().map_err(|e| self.error(e))?;
        debug!(pipeline = %self.name, count = sources.len(), "collected sources");

        self.fs
            .create_dir_all(&self.dest)
            .map_err(|cause| {
                self.error(PipelineErrorKind::Write {
                    path: self.dest.clone(),
                    cause,
                })
            })?;

        let mut report = PipelineReport {
            pipeline: self.name.clone(),
            ..PipelineReport::default()
        };

        for rel in sources {
            match self.process_file(&rel).await {
                Ok(outcome) => {
                    report.files += 1;
                    if outcome == FileOutcome::Written {
                        report.written += 1;
                    }
                }
                Err(kind) => match self.policy {
                    FailurePolicy::FailFast => return Err(self.error(kind)),
                    FailurePolicy::LogAndContinue => {
                        let warning = into_warning(kind, &rel);
                        warn!(pipeline = %self.name, "skipping file: {warning}");
                        report.warnings.push(warning);
                    }
                },
            }
        }

        info!(
            pipeline = %self.name,
            files = report.files,
            written = report.written,
            skipped = report.warnings.len(),
            "pipeline finished"
        );
        Ok(report)
    }

    fn error(&self, kind: PipelineErrorKind) -> PipelineError {
        PipelineError::new(self.name.clone(), self.policy, kind)
    }

    /// Root-relative paths of all matching source files, sorted.
    ///
    /// A missing root is an empty source set.
    fn collect_sources(&self) -> Result<Vec<PathBuf>, PipelineErrorKind> {
        if !self.fs.is_dir(&self.root) {
            warn!(pipeline = %self.name, root = ?self.root, "source root does not exist; nothing to do");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let entries = self
                .fs
                .read_dir(&dir)
                .map_err(|cause| PipelineErrorKind::Source {
                    root: self.root.clone(),
                    cause,
                })?;
            for path in entries {
                if self.fs.is_dir(&path) {
                    stack.push(path);
                } else if self.fs.is_file(&path) {
                    if let Ok(rel) = path.strip_prefix(&self.root) {
                        let rel_str = rel.to_string_lossy().replace('\\', "/");
                        if self.sources.is_match(&rel_str) {
                            files.push(rel.to_path_buf());
                        }
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn process_file(&self, rel: &Path) -> Result<FileOutcome, PipelineErrorKind> {
        let bytes = self
            .fs
            .read(&self.root.join(rel))
            .map_err(|e| TransformError::new("read", rel, format!("{e:#}")))?;

        let mut asset = Asset::new(rel, bytes);
        for step in &self.steps {
            asset = step.apply(asset).await?;
        }

        let out = self.output_path(&asset.path)?;
        let mut outcome = self.write_if_changed(&out, &asset.content)?;

        if let Some(map) = &asset.source_map {
            let mut map_path = out.clone().into_os_string();
            map_path.push(".map");
            if self.write_if_changed(Path::new(&map_path), map)? == FileOutcome::Written {
                outcome = FileOutcome::Written;
            }
        }

        debug!(pipeline = %self.name, file = ?rel, out = ?out, ?outcome, "processed file");
        Ok(outcome)
    }

    /// Resolve an asset path under `dest`, refusing anything that would escape it.
    fn output_path(&self, rel: &Path) -> Result<PathBuf, PipelineErrorKind> {
        let escapes = rel.as_os_str().is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(PipelineErrorKind::OutsideDestination {
                path: rel.to_path_buf(),
                dest: self.dest.clone(),
            });
        }
        Ok(self.dest.join(rel))
    }

    fn write_if_changed(&self, path: &Path, content: &[u8]) -> Result<FileOutcome, PipelineErrorKind> {
        if self.fs.is_file(path) {
            if let Ok(existing) = self.fs.read(path) {
                if existing == content {
                    return Ok(FileOutcome::Unchanged);
                }
            }
        }
        self.fs
            .write(path, content)
            .map_err(|cause| PipelineErrorKind::Write {
                path: path.to_path_buf(),
                cause,
            })?;
        Ok(FileOutcome::Written)
    }
}

/// Flatten a per-file failure into a warning entry.
fn into_warning(kind: PipelineErrorKind, rel: &Path) -> TransformError {
    match kind {
        PipelineErrorKind::Transform(err) => err,
        other => TransformError::new("write", rel, other.to_string()),
    }
}

/// Source globs: `*` stays within one directory level, `**` crosses them.
fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
