// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of running tasks
//! itself. `RealExecutorBackend` spawns each run on the Tokio runtime and
//! reports a `TaskCompleted` event when it ends; tests can provide their
//! own backend that, for example, records runs and completes them directly.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{RuntimeEvent, ScheduledRun};
use crate::errors::Result;
use crate::exec::report::summarize;
use crate::graph::TaskRegistry;

/// Trait abstracting how scheduled runs are executed.
pub trait ExecutorBackend: Send {
    /// Start `run`. Must not wait for the run to finish: completion is
    /// reported later as a `RuntimeEvent::TaskCompleted`.
    fn dispatch(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    tasks: TaskRegistry,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl RealExecutorBackend {
    pub fn new(tasks: TaskRegistry, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tasks, runtime_tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn dispatch(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let lookup = self.tasks.require(run.task.as_str());
        let tx = self.runtime_tx.clone();

        Box::pin(async move {
            let task = lookup?;

            tokio::spawn(async move {
                debug!(task = %run.task, run = run.run_no, "run started");
                let started = Instant::now();
                let result = task.run().await;
                let outcome = summarize(&run, &result, started.elapsed());

                if let Err(err) = tx
                    .send(RuntimeEvent::TaskCompleted {
                        task: run.task,
                        outcome,
                    })
                    .await
                {
                    warn!("failed to send RuntimeEvent::TaskCompleted: {err}");
                }
            });

            Ok(())
        })
    }
}
