//! Cooperative cancellation flag.
//!
//! [`CancelToken`] is an `Arc<AtomicBool>` threaded through every suspension
//! point: the engine checks it between layers and before each node dispatch,
//! and node definitions receive it through the evaluation context so long
//! backend calls can bail out early. Tripping the token is a request, not a
//! guarantee of instant stop -- in-flight work finishes or aborts at the
//! backend's discretion, but nothing further is dispatched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shareable cancellation flag. Cloning yields a handle onto the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
