// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::server::ReloadNotifier;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Async shell around [`CoreRuntime`].
///
/// It is the only owner of run state. Watchers and executors talk to it
/// exclusively through `event_rx`, so recording a trigger never waits for a
/// running task.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    notifier: Arc<dyn ReloadNotifier>,
    // Broadcasts write to sockets, so they run on the blocking pool.
    reloads: Vec<JoinHandle<()>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            notifier,
            reloads: Vec::new(),
        }
    }

    /// Process events until shutdown, the core asks to exit, or every
    /// sender is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("devflow runtime started");

        while let Some(event) = self.event_rx.recv().await {
            debug!(?event, "runtime event");
            let step = self.core.step(event);

            for command in step.commands {
                self.apply(command).await?;
            }
            if !step.keep_running {
                info!("runtime stopping");
                self.finish_reloads().await;
                return Ok(());
            }
        }

        info!("all event senders dropped; runtime stopping");
        self.finish_reloads().await;
        Ok(())
    }

    async fn finish_reloads(&mut self) {
        for handle in self.reloads.drain(..) {
            if let Err(e) = handle.await {
                warn!("reload notification failed: {e}");
            }
        }
    }

    async fn apply(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(run) => {
                debug!(task = %run.task, run = run.run_no, "dispatching run");
                self.executor.dispatch(run).await?;
            }
            CoreCommand::NotifyReload(task) => {
                info!(task = %task, "rebuild succeeded; reloading clients");
                self.reloads.retain(|h| !h.is_finished());
                let notifier = self.notifier.clone();
                self.reloads
                    .push(tokio::task::spawn_blocking(move || notifier.notify_reload()));
            }
            CoreCommand::RequestExit => debug!("every task idle; exit requested"),
        }
        Ok(())
    }
}
