//! Bounded admission gate for in-flight store calls.

use crate::error::{ProbeError, ProbeResult};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps how many remote operations run at once.
///
/// Cloning yields another handle to the same gate.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One admitted slot. The slot returns to the limiter when dropped, so it is
/// released on every exit path including errors and panics.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionSlot {
    /// Return the slot early.
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `capacity` callers.
    pub fn new(capacity: usize) -> ProbeResult<Self> {
        if capacity == 0 {
            return Err(ProbeError::Config(
                "concurrency capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) -> ProbeResult<AdmissionSlot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProbeError::LimiterClosed)?;
        Ok(AdmissionSlot { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}
