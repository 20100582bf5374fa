// src/orchestrate.rs

//! Entry orchestration: initial build, then serve, then watch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::loader::load_or_builtin;
use crate::config::model::ConfigFile;
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::{DevflowError, Result, TaskError};
use crate::exec::{RealExecutorBackend, log_task_error};
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::{Task, TaskId, TaskRegistry, TaskResult};
use crate::pipeline::PipelineReport;
use crate::server::{ReloadCoordinator, ReloadNotifier};
use crate::types::InitialMode;
use crate::watch::{WatchController, WatcherHandle};

/// Capacity of the runtime event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A loaded configuration and the tasks built from it.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: ConfigFile,
    pub tasks: TaskRegistry,
}

impl Project {
    /// Load `config_path` (or the built-in layout) with relative paths
    /// resolved against the config file's directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let root = config_root_dir(config_path);
        let config = load_or_builtin(config_path)?.rooted_at(&root);
        Self::from_config(config, Arc::new(RealFileSystem))
    }

    pub fn from_config(config: ConfigFile, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let tasks = TaskRegistry::from_config(&config, fs)?;
        Ok(Self { config, tasks })
    }

    /// The top-level tasks of the initial build, in configured order.
    pub fn initial_children(&self) -> Result<Vec<Task>> {
        self.config
            .initial_tasks()
            .iter()
            .map(|name| self.tasks.require(name))
            .collect()
    }

    /// Run the initial build.
    ///
    /// A failure of a fail-fast pipeline is fatal. Log-and-continue
    /// pipelines that still failed are reported and the build carries on
    /// with a partially updated output tree. Reports of every child that
    /// succeeded are returned.
    pub async fn initial_build(&self) -> Result<Vec<PipelineReport>> {
        let children = self.initial_children()?;
        info!(tasks = ?self.config.initial_tasks(), mode = ?self.config.build.initial_mode, "initial build");

        let results = match self.config.build.initial_mode {
            InitialMode::Sequence => run_in_order(&children).await,
            InitialMode::Parallel => run_together(&children).await,
        };

        let mut reports = Vec::new();
        let mut failed = 0usize;
        for result in results {
            match result {
                Ok(mut r) => reports.append(&mut r),
                Err(err) => {
                    log_task_error(&err);
                    if err.is_fatal() {
                        return Err(DevflowError::InitialBuild(err));
                    }
                    failed += 1;
                }
            }
        }

        let files: usize = reports.iter().map(|r| r.files).sum();
        if failed > 0 {
            warn!(failed, pipelines = reports.len(), files, "initial build incomplete; continuing with a partial output tree");
        } else {
            info!(pipelines = reports.len(), files, "initial build finished");
        }
        Ok(reports)
    }

    /// Run one named pipeline or composed task once.
    pub async fn run_once(&self, name: &str) -> Result<Vec<PipelineReport>> {
        let task = self.tasks.require(name)?;
        info!(task = %name, "running once");
        task.run().await.map_err(|err| {
            log_task_error(&err);
            DevflowError::Task(err)
        })
    }

    /// Build, start the server and the watcher, and hand back the runtime
    /// that is ready to process triggers.
    pub async fn start_dev(&self, coordinator: Arc<ReloadCoordinator>) -> Result<DevSession> {
        self.initial_build().await?;

        coordinator.start_server(&self.config.server.base)?;

        let (tx, rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);
        let watcher = WatchController::from_config(&self.config)?.start(tx.clone())?;

        let known = self.tasks.names().map(TaskId::from);
        let core = CoreRuntime::new(known, RuntimeOptions::default());
        let executor = RealExecutorBackend::new(self.tasks.clone(), tx.clone());
        let notifier: Arc<dyn ReloadNotifier> = coordinator;
        let runtime = Runtime::new(core, rx, executor, notifier);

        Ok(DevSession {
            watcher,
            events: tx,
            runtime,
        })
    }

    /// Entry orchestration for the `dev` command. Runs until Ctrl-C.
    pub async fn dev(&self) -> Result<()> {
        let coordinator = Arc::new(ReloadCoordinator::new(self.config.server.clone()));
        let session = self.start_dev(coordinator).await?;

        let tx = session.sender();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("shutdown requested");
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });

        session.run().await
    }

    /// One line per pipeline, composed task and watch rule.
    pub fn describe(&self) -> String {
        let cfg = &self.config;
        let mut out = String::new();

        out.push_str(&format!("pipelines ({}):\n", cfg.pipeline.len()));
        for (name, p) in cfg.pipeline.iter() {
            let steps: Vec<&str> = p.steps.iter().map(|s| s.kind()).collect();
            out.push_str(&format!(
                "  - {name}: {:?} {:?} -> {:?} [{}] steps={:?}\n",
                p.root, p.src, p.dest, p.policy, steps
            ));
        }

        out.push_str(&format!("tasks ({}):\n", cfg.task.len()));
        for (name, t) in cfg.task.iter() {
            let kind = if t.sequence.is_some() { "sequence" } else { "parallel" };
            out.push_str(&format!("  - {name}: {kind} {:?}\n", t.children()));
        }

        out.push_str(&format!(
            "initial build ({:?}): {:?}\n",
            cfg.build.initial_mode,
            cfg.initial_tasks()
        ));

        out.push_str("watch rules:\n");
        for (name, p) in cfg.pipeline.iter() {
            for pattern in &p.watch {
                out.push_str(&format!("  - {pattern} -> {name}\n"));
            }
        }
        for rule in &cfg.rule {
            out.push_str(&format!("  - {:?} -> {}", rule.watch, rule.task));
            if !rule.exclude.is_empty() {
                out.push_str(&format!(" (exclude {:?})", rule.exclude));
            }
            out.push('\n');
        }
        out
    }
}

/// A running watcher plus the runtime consuming its triggers.
pub struct DevSession {
    watcher: WatcherHandle,
    events: mpsc::Sender<RuntimeEvent>,
    runtime: Runtime<RealExecutorBackend>,
}

impl DevSession {
    /// Sender for injecting runtime events (manual triggers, shutdown).
    pub fn sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.events.clone()
    }

    pub fn watch_root(&self) -> &Path {
        self.watcher.root()
    }

    /// Process events until shutdown. Keeps the watcher alive meanwhile.
    pub async fn run(self) -> Result<()> {
        let DevSession {
            watcher,
            events,
            runtime,
        } = self;
        drop(events);
        let result = runtime.run().await;
        drop(watcher);
        result
    }
}

/// Run `children` one after another. Only a fatal failure stops the rest.
async fn run_in_order(children: &[Task]) -> Vec<TaskResult> {
    let mut results = Vec::with_capacity(children.len());
    for child in children {
        let result = child.run().await;
        let fatal = matches!(&result, Err(err) if err.is_fatal());
        results.push(result);
        if fatal {
            break;
        }
    }
    results
}

/// Run `children` concurrently and wait for every one of them.
async fn run_together(children: &[Task]) -> Vec<TaskResult> {
    let handles: Vec<_> = children
        .iter()
        .map(|child| (child.id().clone(), tokio::spawn(child.run())))
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (task, handle) in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(TaskError::Panicked {
                task,
                message: join_err.to_string(),
            }),
        });
    }
    results
}

/// Directory that relative config paths are resolved against.
///
/// A bare file name like `Devflow.toml` resolves against the current
/// working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
