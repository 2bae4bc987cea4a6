//! Shared worker pool for cell computation.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::StoreError;

/// Handle to a pool of compute threads.
///
/// Constructed once and passed explicitly to every store (and to any other
/// component that computes cells), so the pool's lifetime is owned by the
/// caller. Cloning shares the same threads.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl WorkerPool {
    /// Create a pool with `threads` workers.
    pub fn new(threads: NonZeroUsize) -> Result<Self, StoreError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .thread_name(|i| format!("feature-worker-{i}"))
            .build()
            .map_err(|e| StoreError::Configuration(format!("failed to build worker pool: {e}")))?;

        tracing::debug!(threads = threads.get(), "Worker pool started");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create a pool sized to the available hardware parallelism.
    pub fn with_available_parallelism() -> Result<Self, StoreError> {
        let threads = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::new(threads)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run a job on the pool without waiting for it.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.pool.spawn(job);
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}
