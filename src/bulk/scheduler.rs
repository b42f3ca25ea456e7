//! Concurrency limit on batches driven at once.
//!
//! Each batch task holds a permit while it polls and collects; extra tasks
//! wait for a free slot. Slots are released when the permit is dropped,
//! including when the task is aborted.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// BatchScheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Semaphore-backed slot pool shared by the batch tasks of one orchestrator.
#[derive(Clone)]
pub struct BatchScheduler {
    sem: Arc<Semaphore>,
    capacity: usize,
}

impl BatchScheduler {
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");

        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<BatchPermit, AppError> {
        let permit = self
            .sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("Batch scheduler was closed".to_string()))?;

        Ok(BatchPermit {
            _permit: permit,
            scheduler: self.clone(),
        })
    }

    /// Takes a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<BatchPermit> {
        let permit = self.sem.clone().try_acquire_owned().ok()?;
        Some(BatchPermit {
            _permit: permit,
            scheduler: self.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Batches currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.sem.available_permits()
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BatchPermit
// ─────────────────────────────────────────────────────────────────────────────

/// An occupied slot; dropping it frees the slot.
pub struct BatchPermit {
    _permit: OwnedSemaphorePermit,
    scheduler: BatchScheduler,
}

impl BatchPermit {
    /// Batches holding a slot, this one included.
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }
}
