//! The compute backend boundary.
//!
//! The engine never knows how geometry is actually computed -- only that node
//! definitions can issue `invoke(operation, params)` requests that may be
//! slow, may fail, and are serviced by a shared worker pool behind a message
//! boundary. The engine's obligations at this seam: never assume synchronous
//! completion, always await with cancellation possible, and keep each node
//! evaluation self-contained.

use async_trait::async_trait;
use nodal_core::Value;

use crate::error::BackendError;

/// Asynchronous request/response interface to the geometry computation
/// module.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Dispatches one operation and awaits its result.
    async fn invoke(&self, operation: &str, params: Value) -> Result<Value, BackendError>;

    /// Aborts outstanding requests, if the transport supports it. Called by
    /// `DagEngine::cancel_all`; the default does nothing.
    fn abort_all(&self) {}

    /// Size of the backend's worker pool. The engine bounds sibling
    /// concurrency to this by default.
    fn pool_size(&self) -> usize {
        1
    }
}

/// A backend that is never available. Useful as a placeholder for graphs
/// whose node definitions do all their work in-process; any node that does
/// reach for the backend fails with a retryable `Unavailable` error rather
/// than aborting the run.
#[derive(Debug, Default)]
pub struct NullBackend;

#[async_trait]
impl ComputeBackend for NullBackend {
    async fn invoke(&self, operation: &str, _params: Value) -> Result<Value, BackendError> {
        Err(BackendError::Unavailable {
            reason: format!("no compute backend attached (operation '{operation}')"),
            retryable: true,
        })
    }
}
