//! Cancellation tokens for indexing runs.
//!
//! A run owns one token; `stop()` flips it and the traversal observes the
//! flag at every file and directory boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shareable cancellation flag for one indexing run.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled, so loops can
    /// bail out with the `?` operator.
    #[inline]
    pub fn check(&self) -> Option<()> {
        if self.is_cancelled() {
            None
        } else {
            Some(())
        }
    }
}
