//! Bounded admission for browsing contexts.
//!
//! Browser contexts are memory- and CPU-expensive; the pool caps how many
//! run at once. It also enforces the close invariant: once any context has
//! failed to close, the pool is poisoned and refuses new admissions until
//! the process is restarted with a fresh engine.

use crate::error::CaptureError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Default maximum concurrent capture sessions.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

pub struct ContextPool {
    semaphore: Arc<Semaphore>,
    max: usize,
    poisoned: AtomicBool,
}

impl ContextPool {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            poisoned: AtomicBool::new(false),
        }
    }

    /// Acquire a slot for one browsing context, waiting if the pool is at
    /// capacity. Fails immediately once the pool is poisoned.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, CaptureError> {
        if self.is_poisoned() {
            return Err(CaptureError::DriverUnavailable(
                "a previous browsing context failed to close; refusing new captures".into(),
            ));
        }
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CaptureError::DriverUnavailable("context pool closed".into()))
    }

    /// Mark the pool poisoned after a context failed to close.
    pub fn poison(&self) {
        warn!("context pool poisoned: a browsing context failed to close");
        self.poisoned.store(true, Ordering::SeqCst);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Slots currently in use.
    pub fn active(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}
