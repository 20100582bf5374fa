// src/graph/job.rs

//! The seam between the task graph and the work a leaf performs.

use std::future::Future;
use std::pin::Pin;

use crate::errors::PipelineError;
use crate::pipeline::{Pipeline, PipelineReport};

pub type JobFuture<'a> =
    Pin<Box<dyn Future<Output = Result<PipelineReport, PipelineError>> + Send + 'a>>;

/// Anything a leaf task can run.
///
/// Production leaves are [`Pipeline`]s; tests plug in jobs with controlled
/// timing and outcomes.
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self) -> JobFuture<'_>;
}

impl Job for Pipeline {
    fn name(&self) -> &str {
        Pipeline::name(self)
    }

    fn run(&self) -> JobFuture<'_> {
        Box::pin(Pipeline::run(self))
    }
}
