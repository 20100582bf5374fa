// src/engine/mod.rs

//! Run serialization engine.
//!
//! This module ties together:
//! - the per-task run table (Idle / Running / RunningWithPendingRerun)
//! - reload gating on run completion
//! - the main runtime event loop that reacts to:
//!   - file-watch triggers
//!   - task completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::graph::TaskId;

/// Outcome of one task run, as seen by the run serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// Why a task was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Manual trigger (CLI or tests).
    Manual,
    /// Triggered due to a filesystem event.
    FileWatch,
}

/// One execution of a task handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRun {
    pub task: TaskId,
    /// 1-based count of runs started for this task.
    pub run_no: u64,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once every task is Idle again.
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from watchers, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task should be (logically) triggered.
    TaskTriggered { task: TaskId, reason: TriggerReason },
    /// A task run finished with a concrete outcome.
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod run_table;
pub mod runtime;

pub use core::{CoreCommand, CoreRuntime, CoreStep};
pub use run_table::{CompletionDecision, RunState, RunTable, TriggerDecision};
pub use runtime::Runtime;
