// src/graph/task.rs

//! Task nodes and the `sequence` / `parallel` combinators.
//!
//! A [`Task`] is a pure description: an identifier plus a node. Running it
//! produces a fresh `'static` future each time, so the same task can be run
//! repeatedly by the engine without carrying any state between runs.

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::errors::TaskError;
use crate::graph::job::Job;
use crate::pipeline::PipelineReport;

/// Stable task identity: a configured name, or a composed path such as
/// `seq(markup,par(styles,scripts))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Reports of every leaf that ran, in completion-independent tree order.
pub type TaskResult = Result<Vec<PipelineReport>, TaskError>;

pub type TaskFuture = Pin<Box<dyn Future<Output = TaskResult> + Send + 'static>>;

pub enum TaskNode {
    Leaf(Arc<dyn Job>),
    Sequence(Vec<Task>),
    Parallel(Vec<Task>),
}

/// A composable unit of work.
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    node: Arc<TaskNode>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.node.as_ref() {
            TaskNode::Leaf(_) => "leaf",
            TaskNode::Sequence(_) => "sequence",
            TaskNode::Parallel(_) => "parallel",
        };
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &kind)
            .finish()
    }
}

impl Task {
    /// A leaf named after its job.
    pub fn leaf(job: Arc<dyn Job>) -> Self {
        Self {
            id: TaskId::new(job.name()),
            node: Arc::new(TaskNode::Leaf(job)),
        }
    }

    /// Run `children` one at a time; the first failure skips the rest.
    pub fn sequence(children: Vec<Task>) -> Self {
        Self {
            id: composed_id("seq", &children),
            node: Arc::new(TaskNode::Sequence(children)),
        }
    }

    /// Run `children` concurrently, each to completion.
    pub fn parallel(children: Vec<Task>) -> Self {
        Self {
            id: composed_id("par", &children),
            node: Arc::new(TaskNode::Parallel(children)),
        }
    }

    /// Replace the derived identifier with a configured name.
    pub fn named(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn node(&self) -> &TaskNode {
        &self.node
    }

    /// Names of all leaf jobs below this task, in tree order.
    pub fn leaf_names(&self) -> Vec<String> {
        match self.node.as_ref() {
            TaskNode::Leaf(job) => vec![job.name().to_string()],
            TaskNode::Sequence(children) | TaskNode::Parallel(children) => {
                children.iter().flat_map(Task::leaf_names).collect()
            }
        }
    }

    /// Start one execution of this task.
    pub fn run(&self) -> TaskFuture {
        let task = self.clone();
        Box::pin(async move {
            match task.node.as_ref() {
                TaskNode::Leaf(job) => run_leaf(&task.id, job.as_ref()).await,
                TaskNode::Sequence(children) => run_sequence(&task.id, children).await,
                TaskNode::Parallel(children) => run_parallel(&task.id, children).await,
            }
        })
    }
}

fn composed_id(op: &str, children: &[Task]) -> TaskId {
    let inner: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
    TaskId(format!("{op}({})", inner.join(",")))
}

async fn run_leaf(id: &TaskId, job: &dyn Job) -> TaskResult {
    debug!(task = %id, "leaf started");
    match job.run().await {
        Ok(report) => Ok(vec![report]),
        Err(error) => Err(TaskError::Leaf {
            task: id.clone(),
            error,
        }),
    }
}

async fn run_sequence(id: &TaskId, children: &[Task]) -> TaskResult {
    let mut reports = Vec::new();
    for (idx, child) in children.iter().enumerate() {
        match child.run().await {
            Ok(mut r) => reports.append(&mut r),
            Err(err) => {
                let skipped = children.len() - idx - 1;
                if skipped > 0 {
                    debug!(task = %id, failed = %child.id, skipped, "sequence aborted");
                }
                return Err(err);
            }
        }
    }
    Ok(reports)
}

async fn run_parallel(id: &TaskId, children: &[Task]) -> TaskResult {
    // Every branch is spawned before any is awaited, so they all run to
    // completion regardless of how their siblings end.
    let handles: Vec<_> = children
        .iter()
        .map(|child| (child.id.clone(), tokio::spawn(child.run())))
        .collect();

    let mut reports = Vec::new();
    let mut failures = Vec::new();

    for (child_id, handle) in handles {
        match handle.await {
            Ok(Ok(mut r)) => reports.append(&mut r),
            Ok(Err(err)) => failures.push(err),
            Err(join_err) => {
                let message = panic_message(join_err);
                warn!(task = %child_id, %message, "parallel branch panicked");
                failures.push(TaskError::Panicked {
                    task: child_id,
                    message,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(reports)
    } else {
        Err(TaskError::Parallel {
            task: id.clone(),
            failures,
        })
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::errors::{PipelineError, PipelineErrorKind, TransformError};
    use crate::graph::job::JobFuture;
    use crate::types::FailurePolicy;

    /// Records start/finish into a shared log.
    struct Step {
        name: &'static str,
        delay_ms: u64,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Job for Step {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self) -> JobFuture<'_> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("start {}", self.name));
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                self.log.lock().unwrap().push(format!("end {}", self.name));
                if self.fail {
                    Err(PipelineError::new(
                        self.name,
                        FailurePolicy::FailFast,
                        PipelineErrorKind::Transform(TransformError::new("copy", "x", "boom")),
                    ))
                } else {
                    Ok(PipelineReport {
                        pipeline: self.name.to_string(),
                        ..PipelineReport::default()
                    })
                }
            })
        }
    }

    fn step(name: &'static str, delay_ms: u64, fail: bool, log: &Arc<Mutex<Vec<String>>>) -> Task {
        Task::leaf(Arc::new(Step {
            name,
            delay_ms,
            fail,
            log: Arc::clone(log),
        }))
    }

    #[test]
    fn composed_ids_are_structural() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t = Task::sequence(vec![
            step("markup", 0, false, &log),
            Task::parallel(vec![step("styles", 0, false, &log), step("scripts", 0, false, &log)]),
        ]);
        assert_eq!(t.id().as_str(), "seq(markup,par(styles,scripts))");
        assert_eq!(t.clone().named("build").id().as_str(), "build");
        assert_eq!(t.leaf_names(), vec!["markup", "styles", "scripts"]);
    }

    #[tokio::test]
    async fn sequence_failure_skips_remaining() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t = Task::sequence(vec![step("a", 0, true, &log), step("b", 0, false, &log)]);

        let err = t.run().await.unwrap_err();
        assert!(matches!(err, TaskError::Leaf { ref task, .. } if task.as_str() == "a"));
        assert_eq!(*log.lock().unwrap(), vec!["start a", "end a"]);
    }

    #[tokio::test]
    async fn sequence_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t = Task::sequence(vec![step("a", 20, false, &log), step("b", 0, false, &log)]);
        let reports = t.run().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["start a", "end a", "start b", "end b"]);
    }

    #[tokio::test]
    async fn parallel_failure_lets_siblings_finish() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t = Task::parallel(vec![
            step("a", 0, true, &log),
            step("b", 50, false, &log),
            step("c", 10, true, &log),
        ]);

        let err = t.run().await.unwrap_err();
        match err {
            TaskError::Parallel { failures, .. } => {
                let ids: Vec<String> = failures
                    .iter()
                    .map(|f| match f {
                        TaskError::Leaf { task, .. } => task.to_string(),
                        other => panic!("unexpected {other:?}"),
                    })
                    .collect();
                assert_eq!(ids, vec!["a", "c"]);
            }
            other => panic!("expected parallel failure, got {other:?}"),
        }
        assert!(log.lock().unwrap().contains(&"end b".to_string()));
    }

    struct Panics;

    impl Job for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn run(&self) -> JobFuture<'_> {
            Box::pin(async {
                if true {
                    panic!("kaboom");
                }
                Ok(PipelineReport::default())
            })
        }
    }

    #[tokio::test]
    async fn panicking_branch_is_reported() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let t = Task::parallel(vec![Task::leaf(Arc::new(Panics)), step("ok", 0, false, &log)]);
        let err = t.run().await.unwrap_err();
        match err {
            TaskError::Parallel { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert!(matches!(&failures[0], TaskError::Panicked { message, .. } if message == "kaboom"));
            }
            other => panic!("expected parallel failure, got {other:?}"),
        }
    }
}
