use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{ExtractError, Result};

/// Shared work-stealing pool for course tasks, batches and forked meetings.
///
/// Everything submitted through [`WorkerPool::install`] runs on this pool,
/// and any rayon parallelism started inside it stays on the same threads.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `workers` threads (0 = one per CPU).
    pub fn new(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("catx-worker-{i}"))
            .build()
            .map_err(|e| ExtractError::Config(format!("cannot start worker pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Run `op` inside the pool and wait for it.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}
