//! Bounded concurrency over a counting semaphore.
//!
//! The limiter hands out owned permits, so a permit can be acquired by the
//! dispatcher and moved into the task it spawns. It is independent of the
//! spawning mechanism.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use vouch_core::{ValidationError, VouchError, VouchResult};

/// Caps the number of simultaneously executing operations.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Result<Self, ValidationError> {
        if capacity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "concurrency".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    ///
    /// Fails with [`VouchError::Cancelled`] once the limiter is closed.
    pub async fn acquire(&self) -> VouchResult<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| VouchError::Cancelled)
    }

    /// Reject all pending and future acquisitions.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }
}
