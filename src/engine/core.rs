// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated run table
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) reads events from the
//! channel, hands [`ScheduledRun`]s to the executor and forwards reload
//! notifications. The core itself never touches Tokio, the filesystem or
//! the network, so it is unit tested directly.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::engine::run_table::{CompletionDecision, RunTable, TriggerDecision};
use crate::engine::{RuntimeEvent, RuntimeOptions, ScheduledRun, TaskOutcome, TriggerReason};
use crate::graph::TaskId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Start one run of a task.
    Dispatch(ScheduledRun),
    /// A run of this task succeeded and nothing newer is pending.
    NotifyReload(TaskId),
    /// Request that the runtime exits (`exit_when_idle`).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn keep(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Pure core runtime state.
#[derive(Debug)]
pub struct CoreRuntime {
    known: HashSet<TaskId>,
    table: RunTable,
    run_counts: HashMap<TaskId, u64>,
    options: RuntimeOptions,
}

impl CoreRuntime {
    /// `known` lists every task the executor can run; triggers for anything
    /// else are ignored.
    pub fn new(known: impl IntoIterator<Item = TaskId>, options: RuntimeOptions) -> Self {
        Self {
            known: known.into_iter().collect(),
            table: RunTable::new(),
            run_counts: HashMap::new(),
            options,
        }
    }

    pub fn table(&self) -> &RunTable {
        &self.table
    }

    pub fn is_idle(&self) -> bool {
        self.table.is_idle()
    }

    /// Runs started so far for `task`.
    pub fn runs_started(&self, task: &str) -> u64 {
        self.run_counts.get(task).copied().unwrap_or(0)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskTriggered { task, reason } => self.handle_trigger(task, reason),
            RuntimeEvent::TaskCompleted { task, outcome } => self.handle_completion(task, outcome),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }

    fn handle_trigger(&mut self, task: TaskId, reason: TriggerReason) -> CoreStep {
        if !self.known.contains(&task) {
            warn!(task = %task, "trigger for unknown task ignored");
            return CoreStep::keep(Vec::new());
        }

        match self.table.on_trigger(&task) {
            TriggerDecision::Start => {
                debug!(task = %task, ?reason, "starting run");
                CoreStep::keep(vec![CoreCommand::Dispatch(self.next_run(task))])
            }
            TriggerDecision::Coalesce => {
                info!(task = %task, "change while running; rerun queued");
                CoreStep::keep(Vec::new())
            }
            TriggerDecision::AlreadyPending => {
                debug!(task = %task, "rerun already queued");
                CoreStep::keep(Vec::new())
            }
        }
    }

    fn handle_completion(&mut self, task: TaskId, outcome: TaskOutcome) -> CoreStep {
        let mut commands = Vec::new();

        match self.table.on_complete(&task) {
            CompletionDecision::Rerun => {
                // The pending rerun supersedes this output; no reload yet.
                debug!(task = %task, ?outcome, "starting coalesced rerun");
                commands.push(CoreCommand::Dispatch(self.next_run(task)));
            }
            CompletionDecision::Settle => match outcome {
                TaskOutcome::Success => commands.push(CoreCommand::NotifyReload(task)),
                TaskOutcome::Failed(message) => {
                    warn!(task = %task, %message, "run failed; clients keep the last good build");
                }
            },
        }

        let mut keep_running = true;
        if self.options.exit_when_idle && self.table.is_idle() {
            keep_running = false;
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            keep_running,
        }
    }

    fn next_run(&mut self, task: TaskId) -> ScheduledRun {
        let count = self.run_counts.entry(task.clone()).or_insert(0);
        *count += 1;
        ScheduledRun {
            task,
            run_no: *count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(exit_when_idle: bool) -> CoreRuntime {
        CoreRuntime::new(
            [TaskId::from("styles"), TaskId::from("scripts")],
            RuntimeOptions { exit_when_idle },
        )
    }

    fn trigger(task: &str) -> RuntimeEvent {
        RuntimeEvent::TaskTriggered {
            task: TaskId::from(task),
            reason: TriggerReason::FileWatch,
        }
    }

    fn completed(task: &str, outcome: TaskOutcome) -> RuntimeEvent {
        RuntimeEvent::TaskCompleted {
            task: TaskId::from(task),
            outcome,
        }
    }

    fn dispatch(task: &str, run_no: u64) -> CoreCommand {
        CoreCommand::Dispatch(ScheduledRun {
            task: TaskId::from(task),
            run_no,
        })
    }

    #[test]
    fn success_notifies_reload() {
        let mut core = core(false);
        assert_eq!(core.step(trigger("styles")).commands, vec![dispatch("styles", 1)]);

        let step = core.step(completed("styles", TaskOutcome::Success));
        assert_eq!(step.commands, vec![CoreCommand::NotifyReload(TaskId::from("styles"))]);
        assert!(step.keep_running);
        assert!(core.is_idle());
    }

    #[test]
    fn failure_does_not_notify() {
        let mut core = core(false);
        core.step(trigger("scripts"));
        let step = core.step(completed("scripts", TaskOutcome::Failed("boom".into())));
        assert!(step.commands.is_empty());
        assert!(core.is_idle());
    }

    #[test]
    fn burst_yields_one_rerun_and_one_reload() {
        let mut core = core(false);
        core.step(trigger("scripts"));
        for _ in 0..10 {
            assert!(core.step(trigger("scripts")).commands.is_empty());
        }

        // First run finishes: rerun instead of reload.
        let step = core.step(completed("scripts", TaskOutcome::Success));
        assert_eq!(step.commands, vec![dispatch("scripts", 2)]);

        let step = core.step(completed("scripts", TaskOutcome::Success));
        assert_eq!(
            step.commands,
            vec![CoreCommand::NotifyReload(TaskId::from("scripts"))]
        );
        assert_eq!(core.runs_started("scripts"), 2);
    }

    #[test]
    fn failed_run_with_pending_rerun_still_reruns() {
        let mut core = core(false);
        core.step(trigger("styles"));
        core.step(trigger("styles"));
        let step = core.step(completed("styles", TaskOutcome::Failed("bad".into())));
        assert_eq!(step.commands, vec![dispatch("styles", 2)]);
    }

    #[test]
    fn unknown_trigger_is_ignored() {
        let mut core = core(false);
        let step = core.step(trigger("images"));
        assert!(step.commands.is_empty());
        assert!(core.is_idle());
    }

    #[test]
    fn exit_when_idle_after_last_completion() {
        let mut core = core(true);
        core.step(trigger("styles"));
        core.step(trigger("scripts"));

        let step = core.step(completed("styles", TaskOutcome::Success));
        assert!(step.keep_running);

        let step = core.step(completed("scripts", TaskOutcome::Success));
        assert!(!step.keep_running);
        assert_eq!(step.commands.last(), Some(&CoreCommand::RequestExit));
    }

    #[test]
    fn shutdown_stops_loop() {
        let mut core = core(false);
        assert!(!core.step(RuntimeEvent::ShutdownRequested).keep_running);
    }
}
