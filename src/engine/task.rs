use crate::error::{ExtractError, Result};

/// One independently schedulable unit of work.
pub trait Task: Send {
    /// Short human-readable name used in logs and failure reports.
    fn label(&self) -> String;

    /// What the task was working on, once known (a course id, say).
    fn subject(&self) -> Option<String> {
        None
    }

    fn compute(&mut self) -> Result<()>;
}

/// Lifecycle of a task inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Completed,
    CompletedExceptionally,
    Cancelled,
}

/// How one task ended.
#[derive(Debug)]
pub struct TaskOutcome {
    pub label: String,
    pub subject: Option<String>,
    pub state: TaskState,
    pub error: Option<ExtractError>,
}

impl TaskOutcome {
    pub(crate) fn finished(task: &dyn Task, result: Result<()>) -> Self {
        let (state, error) = match result {
            Ok(()) => (TaskState::Completed, None),
            Err(e) => (TaskState::CompletedExceptionally, Some(e)),
        };
        Self {
            label: task.label(),
            subject: task.subject(),
            state,
            error,
        }
    }

    pub(crate) fn cancelled(task: &dyn Task) -> Self {
        let label = task.label();
        Self {
            error: Some(ExtractError::Cancelled {
                label: label.clone(),
            }),
            label,
            subject: task.subject(),
            state: TaskState::Cancelled,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.state != TaskState::Completed
    }
}

/// A task built from a closure; handy for ad-hoc batches.
pub struct FnTask<F> {
    label: String,
    op: Option<F>,
}

impl<F> FnTask<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    pub fn new(label: impl Into<String>, op: F) -> Self {
        Self {
            label: label.into(),
            op: Some(op),
        }
    }
}

impl<F> Task for FnTask<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    fn label(&self) -> String {
        self.label.clone()
    }

    fn compute(&mut self) -> Result<()> {
        match self.op.take() {
            Some(op) => op(),
            None => Err(ExtractError::Config(format!(
                "task '{}' already ran",
                self.label
            ))),
        }
    }
}
