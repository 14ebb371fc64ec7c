//! Error taxonomy shared by every pool component.

use crate::{JobId, Lifecycle};

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Error type for pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("queue is closed")]
    QueueClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("timed out after collecting {received} of {expected} results")]
    Timeout { expected: usize, received: usize },

    #[error("cancelled after collecting {received} of {expected} results")]
    Cancelled { expected: usize, received: usize },

    #[error("result stream ended after {received} of {expected} results")]
    Incomplete { expected: usize, received: usize },

    #[error("duplicate result for {0}")]
    DuplicateResult(JobId),

    #[error("result for unknown {0}")]
    UnknownJob(JobId),

    #[error("{0} was already submitted")]
    DuplicateJob(JobId),

    #[error("cannot {operation} while {lifecycle}")]
    InvalidState {
        operation: &'static str,
        lifecycle: Lifecycle,
    },

    #[error("a collector is already running")]
    CollectorBusy,

    #[error("supervisor unavailable: {0}")]
    Supervisor(String),
}

impl PoolError {
    /// Broken one-result-per-job invariant: a worker or queue defect, not a caller mistake.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            PoolError::DuplicateResult(_) | PoolError::UnknownJob(_)
        )
    }

    /// Collection stopped early but the partial results are still valid.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            PoolError::Timeout { .. } | PoolError::Cancelled { .. } | PoolError::Incomplete { .. }
        )
    }
}

/// Returned by a queue push after the queue was closed. Carries the rejected item.
#[derive(thiserror::Error)]
#[error("queue is closed")]
pub struct ClosedQueueError<T>(pub T);

impl<T> ClosedQueueError<T> {
    /// Recover the item that could not be enqueued.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::fmt::Debug for ClosedQueueError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosedQueueError").finish_non_exhaustive()
    }
}

impl<T> From<ClosedQueueError<T>> for PoolError {
    fn from(_: ClosedQueueError<T>) -> Self {
        PoolError::QueueClosed
    }
}
