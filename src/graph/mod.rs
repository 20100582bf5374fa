// src/graph/mod.rs

//! Task graph composition.
//!
//! - [`job`]: the `Job` seam a leaf runs (pipelines in production).
//! - [`task`]: `Task` nodes, the `sequence` / `parallel` combinators and
//!   explicit task identities.
//! - [`registry`]: the named task set built from configuration.

pub mod job;
pub mod registry;
pub mod task;

pub use job::{Job, JobFuture};
pub use registry::TaskRegistry;
pub use task::{Task, TaskFuture, TaskId, TaskNode, TaskResult};
