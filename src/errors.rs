// src/errors.rs

//! Crate-wide error types.
//!
//! The taxonomy follows how far a failure travels:
//! - [`TransformError`]: one file failed one transform step.
//! - [`PipelineError`]: a pipeline as a whole could not complete.
//! - [`TaskError`]: a composed task failed (wraps pipeline errors).
//! - [`WatchSetupError`] / [`ServerStartError`]: fatal startup failures.
//! - [`DevflowError`]: everything the binary can surface.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::TaskId;
use crate::types::FailurePolicy;

/// A single file failed a single transform step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step} failed on {path:?}: {message}")]
pub struct TransformError {
    /// Step kind that failed (e.g. `"css"`).
    pub step: String,
    /// Source-relative path of the offending file.
    pub path: PathBuf,
    pub message: String,
}

impl TransformError {
    pub fn new(step: impl Into<String>, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

/// What went wrong inside a pipeline.
#[derive(Error, Debug)]
pub enum PipelineErrorKind {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("cannot enumerate sources under {root:?}: {cause:#}")]
    Source { root: PathBuf, cause: anyhow::Error },

    #[error("cannot write {path:?}: {cause:#}")]
    Write { path: PathBuf, cause: anyhow::Error },

    #[error("output {path:?} would escape destination {dest:?}")]
    OutsideDestination { path: PathBuf, dest: PathBuf },
}

/// A pipeline could not complete.
#[derive(Error, Debug)]
#[error("pipeline '{pipeline}' failed: {kind}")]
pub struct PipelineError {
    pub pipeline: String,
    /// Policy of the failing pipeline; decides whether the initial build may go on.
    pub policy: FailurePolicy,
    #[source]
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    pub fn new(pipeline: impl Into<String>, policy: FailurePolicy, kind: PipelineErrorKind) -> Self {
        Self {
            pipeline: pipeline.into(),
            policy,
            kind,
        }
    }
}

/// Failure of a (possibly composed) task.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task '{task}': {error}")]
    Leaf {
        task: TaskId,
        #[source]
        error: PipelineError,
    },

    /// Every failed branch of a parallel node, in declaration order.
    #[error("task '{task}': {} parallel branch(es) failed", .failures.len())]
    Parallel { task: TaskId, failures: Vec<TaskError> },

    #[error("task '{task}' panicked: {message}")]
    Panicked { task: TaskId, message: String },
}

impl TaskError {
    /// All pipeline errors contained in this failure, depth first.
    pub fn pipeline_errors(&self) -> Vec<&PipelineError> {
        match self {
            TaskError::Leaf { error, .. } => vec![error],
            TaskError::Parallel { failures, .. } => {
                failures.iter().flat_map(|f| f.pipeline_errors()).collect()
            }
            TaskError::Panicked { .. } => Vec::new(),
        }
    }

    /// Whether this failure must stop the initial build.
    ///
    /// Only fail-fast pipelines (and panics) are fatal; a log-and-continue
    /// pipeline that still failed as a whole lets the build go on.
    pub fn is_fatal(&self) -> bool {
        match self {
            TaskError::Leaf { error, .. } => error.policy == FailurePolicy::FailFast,
            TaskError::Parallel { failures, .. } => failures.iter().any(TaskError::is_fatal),
            TaskError::Panicked { .. } => true,
        }
    }
}

/// The filesystem could not be monitored.
#[derive(Error, Debug)]
#[error("cannot watch {root:?}: {message}")]
pub struct WatchSetupError {
    pub root: PathBuf,
    pub message: String,
}

/// The static file server or the reload channel could not be started.
#[derive(Error, Debug)]
#[error("cannot start {what} server: {message}")]
pub struct ServerStartError {
    pub what: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum DevflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Initial build failed: {0}")]
    InitialBuild(#[source] TaskError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    WatchSetup(#[from] WatchSetupError),

    #[error(transparent)]
    ServerStart(#[from] ServerStartError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevflowError>;
