pub mod batch;
pub mod decompose;
pub mod pool;
pub mod task;

pub use batch::{BatchExecutor, BatchReport, FailureAction, FailurePolicy};
pub use decompose::{CourseTask, Extraction, UnitContext, UnitFailure};
pub use pool::WorkerPool;
pub use task::{Task, TaskOutcome, TaskState};
