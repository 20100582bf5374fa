// tests/run_serializer.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use devflow::engine::{
    CoreRuntime, RunState, Runtime, RuntimeEvent, RuntimeOptions, ScheduledRun, TriggerReason,
};
use devflow::exec::RealExecutorBackend;
use devflow::graph::{Task, TaskId, TaskRegistry};
use devflow_test_utils::{FakeExecutor, FakeJob, RecordingNotifier, init_tracing, with_timeout};

fn trigger(task: &str) -> RuntimeEvent {
    RuntimeEvent::TaskTriggered {
        task: TaskId::from(task),
        reason: TriggerReason::FileWatch,
    }
}

fn runtime_for(
    job: FakeJob,
    notifier: Arc<RecordingNotifier>,
) -> (Runtime<RealExecutorBackend>, mpsc::Sender<RuntimeEvent>) {
    let mut registry = TaskRegistry::new();
    registry.insert(Task::leaf(Arc::new(job)));

    let (tx, rx) = mpsc::channel(64);
    let known: Vec<TaskId> = registry.names().map(TaskId::from).collect();
    let core = CoreRuntime::new(known, RuntimeOptions { exit_when_idle: true });
    let executor = RealExecutorBackend::new(registry, tx.clone());
    (Runtime::new(core, rx, executor, notifier), tx)
}

/// Two edits 10ms apart while a 200ms bundle is running: exactly one more
/// run afterwards and exactly one reload, for that second run.
#[tokio::test]
async fn edits_during_a_slow_run_coalesce_into_one_rerun() {
    init_tracing();

    let job = FakeJob::new("scripts").with_delay(Duration::from_millis(200));
    let stats = job.stats();
    let notifier = Arc::new(RecordingNotifier::new());
    let (runtime, tx) = runtime_for(job, Arc::clone(&notifier));
    let handle = tokio::spawn(runtime.run());

    tx.send(trigger("scripts")).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    tx.send(trigger("scripts")).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    tx.send(trigger("scripts")).await.unwrap();

    with_timeout(handle).await.unwrap().unwrap();

    assert_eq!(stats.runs(), 2);
    assert_eq!(stats.max_in_flight(), 1);
    assert_eq!(notifier.reloads(), 1);
}

#[tokio::test]
async fn failed_run_does_not_reload() {
    init_tracing();

    let job = FakeJob::new("styles").failing();
    let stats = job.stats();
    let notifier = Arc::new(RecordingNotifier::new());
    let (runtime, tx) = runtime_for(job, Arc::clone(&notifier));
    let handle = tokio::spawn(runtime.run());

    tx.send(trigger("styles")).await.unwrap();
    with_timeout(handle).await.unwrap().unwrap();

    assert_eq!(stats.runs(), 1);
    assert_eq!(notifier.reloads(), 0);
}

#[tokio::test]
async fn runs_spaced_apart_each_reload() {
    init_tracing();

    let job = FakeJob::new("markup");
    let stats = job.stats();
    let notifier = Arc::new(RecordingNotifier::new());

    let mut registry = TaskRegistry::new();
    registry.insert(Task::leaf(Arc::new(job)));
    let (tx, rx) = mpsc::channel(64);
    let core = CoreRuntime::new([TaskId::from("markup")], RuntimeOptions::default());
    let executor = RealExecutorBackend::new(registry, tx.clone());
    let runtime = Runtime::new(core, rx, executor, notifier.clone());
    let handle = tokio::spawn(runtime.run());

    for _ in 0..3 {
        tx.send(trigger("markup")).await.unwrap();
        sleep(Duration::from_millis(50)).await;
    }
    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    with_timeout(handle).await.unwrap().unwrap();

    assert_eq!(stats.runs(), 3);
    assert_eq!(notifier.reloads(), 3);
}

#[tokio::test]
async fn runtime_with_fake_executor_serializes_per_task() {
    init_tracing();

    let (tx, rx) = mpsc::channel(64);
    let executed: Arc<Mutex<Vec<ScheduledRun>>> = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx.clone(), Arc::clone(&executed)).failing("images");
    let notifier = Arc::new(RecordingNotifier::new());

    let core = CoreRuntime::new(
        [TaskId::from("styles"), TaskId::from("images")],
        RuntimeOptions { exit_when_idle: true },
    );
    let runtime = Runtime::new(core, rx, executor, notifier.clone());

    // Queue everything before the runtime starts: the second trigger of each
    // task is coalesced behind the first run.
    for task in ["styles", "images", "styles", "images", "ghost"] {
        tx.send(trigger(task)).await.unwrap();
    }
    with_timeout(runtime.run()).await.unwrap();

    let executed = executed.lock().unwrap();
    let runs: Vec<(String, u64)> = executed
        .iter()
        .map(|r| (r.task.to_string(), r.run_no))
        .collect();
    assert_eq!(
        runs,
        vec![
            ("styles".to_string(), 1),
            ("images".to_string(), 1),
            ("styles".to_string(), 2),
            ("images".to_string(), 2),
        ]
    );
    // Only the settled successful task reloads.
    assert_eq!(notifier.reloads(), 1);
}

#[test]
fn core_reports_run_states() {
    let mut core = CoreRuntime::new([TaskId::from("scripts")], RuntimeOptions::default());
    assert_eq!(core.table().state_of("scripts"), RunState::Idle);
    core.step(trigger("scripts"));
    assert_eq!(core.table().state_of("scripts"), RunState::Running);
    core.step(trigger("scripts"));
    assert_eq!(core.table().state_of("scripts"), RunState::RunningWithPendingRerun);
    assert_eq!(core.runs_started("scripts"), 1);
}
