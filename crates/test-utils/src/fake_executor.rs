use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use devflow::engine::{RuntimeEvent, ScheduledRun, TaskOutcome};
use devflow::errors::Result;
use devflow::exec::ExecutorBackend;

/// A fake executor that:
/// - records which runs were dispatched
/// - immediately reports TaskCompleted for each of them, failing the tasks
///   listed in `failing`.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<ScheduledRun>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<ScheduledRun>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let outcome = if self.failing.contains(run.task.as_str()) {
            TaskOutcome::Failed("forced failure".to_string())
        } else {
            TaskOutcome::Success
        };

        Box::pin(async move {
            {
                let mut guard = executed.lock().unwrap();
                guard.push(run.clone());
            }

            // Completion goes through a spawned send: the runtime is the
            // only receiver and is busy running this very dispatch.
            tokio::spawn(async move {
                let _ = tx
                    .send(RuntimeEvent::TaskCompleted {
                        task: run.task,
                        outcome,
                    })
                    .await;
            });
            Ok(())
        })
    }
}
