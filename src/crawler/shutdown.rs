//! Error aggregation and shutdown signalling
//!
//! The first fatal error reported by any worker is kept; later ones are
//! logged and dropped. Reporting an error, finishing the crawl, or an
//! external interrupt all cancel the same token, and every worker exits at
//! its next suspension point.

use crate::WalkerError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Shared handle to the pipeline's shutdown state
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    first_error: Arc<Mutex<Option<WalkerError>>>,
    completed: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token observed by workers
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Records a fatal error and stops the pipeline
    ///
    /// Only the first error is kept.
    pub fn report(&self, error: WalkerError) {
        {
            let mut slot = self
                .first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if slot.is_none() {
                tracing::error!("Fatal error, shutting down: {}", error);
                *slot = Some(error);
            } else {
                tracing::debug!("Suppressed error during shutdown: {}", error);
            }
        }
        self.token.cancel();
    }

    /// Stops the pipeline because the frontier is exhausted
    pub fn complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    /// Stops the pipeline without an error (e.g. on interrupt)
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True when the pipeline stopped because there was no work left
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has begun
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Takes the first reported error, if any
    pub fn take_error(&self) -> Option<WalkerError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
