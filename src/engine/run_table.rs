// src/engine/run_table.rs

//! Per-task run state.
//!
//! ```text
//! Idle --trigger--> Running --trigger--> RunningWithPendingRerun --trigger--> (same)
//!   ^                  |                          |
//!   +----complete------+                          +--complete--> Running (rerun)
//! ```
//!
//! Pure data; the runtime owns the only instance, so transitions are atomic
//! by construction.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::graph::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    RunningWithPendingRerun,
}

/// What the caller must do about a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// The task was idle: start a run now.
    Start,
    /// A run is in flight: a rerun is now pending.
    Coalesce,
    /// A rerun was already pending; nothing changes.
    AlreadyPending,
}

/// What the caller must do about a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionDecision {
    /// A rerun was pending: start it immediately; the task stays Running.
    Rerun,
    /// The task is Idle again.
    Settle,
}

#[derive(Debug, Default)]
pub struct RunTable {
    // Entries are created lazily on first trigger and never removed.
    states: HashMap<TaskId, RunState>,
}

impl RunTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, task: &str) -> RunState {
        self.states.get(task).copied().unwrap_or_default()
    }

    pub fn on_trigger(&mut self, task: &TaskId) -> TriggerDecision {
        let state = self.states.entry(task.clone()).or_default();
        let (next, decision) = match *state {
            RunState::Idle => (RunState::Running, TriggerDecision::Start),
            RunState::Running => (RunState::RunningWithPendingRerun, TriggerDecision::Coalesce),
            RunState::RunningWithPendingRerun => {
                (RunState::RunningWithPendingRerun, TriggerDecision::AlreadyPending)
            }
        };
        debug!(task = %task, from = ?*state, to = ?next, "trigger");
        *state = next;
        decision
    }

    pub fn on_complete(&mut self, task: &TaskId) -> CompletionDecision {
        let state = self.states.entry(task.clone()).or_default();
        let (next, decision) = match *state {
            RunState::RunningWithPendingRerun => (RunState::Running, CompletionDecision::Rerun),
            RunState::Running => (RunState::Idle, CompletionDecision::Settle),
            RunState::Idle => {
                warn!(task = %task, "completion for a task that was not running");
                (RunState::Idle, CompletionDecision::Settle)
            }
        };
        debug!(task = %task, from = ?*state, to = ?next, "completion");
        *state = next;
        decision
    }

    /// True when no task is running.
    pub fn is_idle(&self) -> bool {
        self.states.values().all(|s| *s == RunState::Idle)
    }
}
