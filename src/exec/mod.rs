// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `RealExecutorBackend` the runtime uses in production; tests replace it
//!   with a fake implementation.
//! - [`report`] turns task results into log lines and engine outcomes.

pub mod backend;
pub mod report;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use report::{log_task_error, summarize};
