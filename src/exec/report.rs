// src/exec/report.rs

use std::time::Duration;

use tracing::{error, info, warn};

use crate::engine::{ScheduledRun, TaskOutcome};
use crate::errors::TaskError;
use crate::graph::TaskResult;

/// Log the result of one run and reduce it to an engine outcome.
///
/// Skipped files of log-and-continue pipelines are logged but still count
/// as success.
pub fn summarize(run: &ScheduledRun, result: &TaskResult, elapsed: Duration) -> TaskOutcome {
    let elapsed_ms = elapsed.as_millis() as u64;
    match result {
        Ok(reports) => {
            let files: usize = reports.iter().map(|r| r.files).sum();
            let written: usize = reports.iter().map(|r| r.written).sum();
            let skipped: usize = reports.iter().map(|r| r.warnings.len()).sum();
            if skipped > 0 {
                warn!(
                    task = %run.task,
                    run = run.run_no,
                    files,
                    written,
                    skipped,
                    elapsed_ms,
                    "run finished with skipped files"
                );
            } else {
                info!(task = %run.task, run = run.run_no, files, written, elapsed_ms, "run finished");
            }
            TaskOutcome::Success
        }
        Err(err) => {
            log_task_error(err);
            error!(task = %run.task, run = run.run_no, elapsed_ms, "run failed");
            TaskOutcome::Failed(err.to_string())
        }
    }
}

/// Log every leaf failure contained in `err`.
pub fn log_task_error(err: &TaskError) {
    match err {
        TaskError::Leaf { task, error } => {
            error!(task = %task, policy = %error.policy, "{error}");
        }
        TaskError::Parallel { failures, .. } => {
            for failure in failures {
                log_task_error(failure);
            }
        }
        TaskError::Panicked { task, message } => {
            error!(task = %task, "task panicked: {message}");
        }
    }
}
