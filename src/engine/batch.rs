use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::config::FailurePolicyKind;
use crate::engine::pool::WorkerPool;
use crate::engine::task::{Task, TaskOutcome};
use crate::error::{ExtractError, Result};

/// What the batch does after a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Continue,
    /// Tasks that have not started yet are skipped.
    Cancel,
}

/// Hook deciding how a batch reacts to failing tasks.
pub trait FailurePolicy: Send + Sync {
    /// Called on the failing task's thread as soon as it fails.
    fn on_failure(&self, label: &str, error: &ExtractError) -> FailureAction;

    /// Whether [`BatchExecutor::execute`] turns failures into an error once
    /// every task has finished.
    fn reraise(&self) -> bool {
        true
    }
}

/// Log, keep going, re-raise at the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAndContinue;

impl FailurePolicy for LogAndContinue {
    fn on_failure(&self, label: &str, error: &ExtractError) -> FailureAction {
        tracing::warn!(task = label, error = %error, "task failed");
        FailureAction::Continue
    }
}

/// Log and cancel everything not yet started.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl FailurePolicy for FailFast {
    fn on_failure(&self, label: &str, error: &ExtractError) -> FailureAction {
        tracing::warn!(task = label, error = %error, "task failed, cancelling batch");
        FailureAction::Cancel
    }
}

/// Record failures silently and never re-raise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Suppress;

impl FailurePolicy for Suppress {
    fn on_failure(&self, label: &str, error: &ExtractError) -> FailureAction {
        tracing::debug!(task = label, error = %error, "task failed (suppressed)");
        FailureAction::Continue
    }

    fn reraise(&self) -> bool {
        false
    }
}

#[must_use]
pub fn policy_for(kind: FailurePolicyKind) -> Box<dyn FailurePolicy> {
    match kind {
        FailurePolicyKind::Continue => Box::new(LogAndContinue),
        FailurePolicyKind::FailFast => Box::new(FailFast),
        FailurePolicyKind::Suppress => Box::new(Suppress),
    }
}

/// Outcomes of one batch, in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    /// Fold the failures into one `Batch` error, if there are any.
    fn into_error(self) -> Option<ExtractError> {
        let failed = self.failed();
        let total = self.total();
        let first = self
            .outcomes
            .into_iter()
            .find(TaskOutcome::is_failure)
            .and_then(|o| o.error)?;
        Some(ExtractError::Batch {
            failed,
            total,
            first: Box::new(first),
        })
    }
}

/// Runs a heterogeneous set of tasks jointly on the shared pool.
pub struct BatchExecutor {
    tasks: Vec<Box<dyn Task>>,
    policy: Box<dyn FailurePolicy>,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(Box::new(LogAndContinue))
    }

    #[must_use]
    pub fn with_policy(policy: Box<dyn FailurePolicy>) -> Self {
        Self {
            tasks: Vec::new(),
            policy,
        }
    }

    pub fn push(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task and join them all. Failures are reported in the
    /// returned outcomes, never raised.
    pub fn run(self, pool: &WorkerPool) -> BatchReport {
        let Self { tasks, policy } = self;
        run_tasks(tasks, policy.as_ref(), pool)
    }

    /// Run every task, then re-raise failures as one `Batch` error unless
    /// the policy suppresses them.
    pub fn execute(self, pool: &WorkerPool) -> Result<BatchReport> {
        let Self { tasks, policy } = self;
        let report = run_tasks(tasks, policy.as_ref(), pool);
        if !policy.reraise() || report.failed() == 0 {
            return Ok(report);
        }
        match report.into_error() {
            Some(err) => Err(err),
            None => Ok(BatchReport::default()),
        }
    }
}

fn run_tasks(tasks: Vec<Box<dyn Task>>, policy: &dyn FailurePolicy, pool: &WorkerPool) -> BatchReport {
    let total = tasks.len();
    let cancel = AtomicBool::new(false);
    tracing::debug!(tasks = total, threads = pool.threads(), "running batch");

    let outcomes: Vec<TaskOutcome> = pool.install(|| {
        tasks
            .into_par_iter()
            .map(|mut task| {
                if cancel.load(Ordering::Acquire) {
                    return TaskOutcome::cancelled(&*task);
                }
                let label = task.label();
                let result = panic::catch_unwind(AssertUnwindSafe(|| task.compute()))
                    .unwrap_or_else(|payload| {
                        Err(ExtractError::TaskPanicked {
                            label: label.clone(),
                            message: panic_message(&*payload),
                        })
                    });
                if let Err(e) = &result {
                    if policy.on_failure(&label, e) == FailureAction::Cancel {
                        cancel.store(true, Ordering::Release);
                    }
                }
                TaskOutcome::finished(&*task, result)
            })
            .collect()
    });

    let report = BatchReport { outcomes };
    tracing::debug!(total, failed = report.failed(), "batch finished");
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::engine::task::{FnTask, TaskState};

    fn counting(label: &str, hits: &Arc<AtomicUsize>, fail: bool) -> Box<dyn Task> {
        let hits = Arc::clone(hits);
        Box::new(FnTask::new(label, move || {
            hits.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(ExtractError::Config("boom".into()))
            } else {
                Ok(())
            }
        }))
    }

    #[test]
    fn default_policy_runs_everything_then_reraises() {
        let pool = WorkerPool::new(4).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let mut batch = BatchExecutor::new();
        for i in 0..10 {
            batch.push(counting(&format!("t{i}"), &hits, i == 3));
        }
        assert_eq!(batch.len(), 10);

        let err = batch.execute(&pool).unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        match err {
            ExtractError::Batch { failed, total, first } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 10);
                assert!(matches!(*first, ExtractError::Config(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn run_reports_without_raising() {
        let pool = WorkerPool::new(2).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let mut batch = BatchExecutor::new();
        batch.push(counting("ok", &hits, false));
        batch.push(counting("bad", &hits, true));
        let report = batch.run(&pool);
        assert_eq!(report.total(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[0].state, TaskState::Completed);
        assert_eq!(report.failures().next().unwrap().label, "bad");
    }

    #[test]
    fn panicking_task_is_recorded_and_reraised() {
        let pool = WorkerPool::new(2).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let mut batch = BatchExecutor::new();
        batch.push(counting("t0", &hits, false));
        batch.push(Box::new(FnTask::new("t1", || panic!("bad record"))));
        batch.push(counting("t2", &hits, false));
        batch.push(counting("t3", &hits, false));

        let err = batch.execute(&pool).unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        match err {
            ExtractError::Batch { failed, total, first } => {
                assert_eq!((failed, total), (1, 4));
                assert!(matches!(
                    *first,
                    ExtractError::TaskPanicked { ref label, ref message }
                        if label == "t1" && message == "bad record"
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn panic_outcome_is_exceptional() {
        let pool = WorkerPool::new(1).unwrap();
        let mut batch = BatchExecutor::new();
        batch.push(Box::new(FnTask::new("fmt", || {
            panic!("{} went wrong", "formatting")
        })));
        batch.push(Box::new(FnTask::new("ok", || Ok(()))));
        let report = batch.run(&pool);
        assert_eq!(report.outcomes[0].state, TaskState::CompletedExceptionally);
        assert_eq!(report.outcomes[1].state, TaskState::Completed);
        assert_eq!(
            report.outcomes[0].error.as_ref().map(ToString::to_string).as_deref(),
            Some("task panicked: fmt: formatting went wrong")
        );
    }

    #[test]
    fn suppress_never_reraises() {
        let pool = WorkerPool::new(2).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let mut batch = BatchExecutor::with_policy(Box::new(Suppress));
        batch.push(counting("bad", &hits, true));
        let report = batch.execute(&pool).unwrap();
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn fail_fast_cancels_pending_tasks() {
        // One worker runs the tasks in submission order.
        let pool = WorkerPool::new(1).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let mut batch = BatchExecutor::with_policy(Box::new(FailFast));
        batch.push(counting("first", &hits, true));
        for i in 0..4 {
            batch.push(counting(&format!("later{i}"), &hits, false));
        }
        let report = batch.run(&pool);
        let cancelled = report
            .outcomes
            .iter()
            .filter(|o| o.state == TaskState::Cancelled)
            .count();
        assert!(cancelled >= 1);
        assert_eq!(hits.load(Ordering::SeqCst) + cancelled, 5);
        assert_eq!(report.failed(), 1 + cancelled);
    }

    #[test]
    fn empty_batch_succeeds() {
        let pool = WorkerPool::new(1).unwrap();
        let batch = BatchExecutor::new();
        assert!(batch.is_empty());
        assert_eq!(batch.execute(&pool).unwrap().total(), 0);
    }

    #[test]
    fn policy_kinds_map_to_policies() {
        let err = ExtractError::Config("x".into());
        assert_eq!(
            policy_for(FailurePolicyKind::FailFast).on_failure("t", &err),
            FailureAction::Cancel
        );
        assert!(!policy_for(FailurePolicyKind::Suppress).reraise());
        assert!(policy_for(FailurePolicyKind::Continue).reraise());
    }
}
