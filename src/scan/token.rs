//! Cooperative cancellation flag for an in-flight scan.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheap-to-clone cancellation flag, checked at batch boundaries and at
/// each directory descent by the scan walk.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once [`CancellationToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
