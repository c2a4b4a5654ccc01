//! Worker Pool
//!
//! A fixed number of interchangeable permits bounding how many sessions run
//! at once. A session holds one [`WorkerPermit`] for its whole lifetime; the
//! permit returns to the pool when it is dropped, which happens exactly once.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Errors returned when a permit cannot be handed out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("no worker became available within {0:?}")]
    Timeout(Duration),

    #[error("worker pool is closed")]
    Closed,
}

/// One unit of the pool's concurrency budget.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

/// Counting semaphore with timed acquisition.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held by sessions.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Waits up to `timeout` for a free permit.
    pub async fn acquire(&self, timeout: Duration) -> Result<WorkerPermit, PoolError> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        match tokio::time::timeout(timeout, acquire).await {
            Ok(Ok(permit)) => Ok(WorkerPermit { _permit: permit }),
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => Err(PoolError::Timeout(timeout)),
        }
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<WorkerPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| WorkerPermit { _permit: permit })
    }

    /// Blocks until every permit has been returned to the pool.
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.semaphore.acquire_many(self.capacity as u32).await {
            drop(all);
        }
    }
}
