use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use devflow::errors::{PipelineError, PipelineErrorKind, TransformError};
use devflow::graph::{Job, JobFuture};
use devflow::pipeline::PipelineReport;
use devflow::types::FailurePolicy;

/// Counters shared between a `FakeJob` and the test observing it.
#[derive(Debug, Default)]
pub struct JobStats {
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl JobStats {
    /// Runs started so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous runs observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// A job with a fixed duration and a switchable outcome.
pub struct FakeJob {
    name: String,
    delay: Duration,
    fail: AtomicBool,
    stats: Arc<JobStats>,
}

impl FakeJob {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            stats: Arc::new(JobStats::default()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    /// Make subsequent runs fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn stats(&self) -> Arc<JobStats> {
        Arc::clone(&self.stats)
    }
}

impl Job for FakeJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> JobFuture<'_> {
        Box::pin(async move {
            let stats = &self.stats;
            stats.runs.fetch_add(1, Ordering::SeqCst);
            let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            stats.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                let err = TransformError::new("fake", format!("{}.src", self.name), "forced failure");
                return Err(PipelineError::new(
                    self.name.clone(),
                    FailurePolicy::FailFast,
                    PipelineErrorKind::Transform(err),
                ));
            }
            Ok(PipelineReport {
                pipeline: self.name.clone(),
                files: 1,
                written: 1,
                warnings: Vec::new(),
            })
        })
    }
}
