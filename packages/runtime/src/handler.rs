//! Job handler trait and function adapter.

use std::future::Future;
use std::pin::Pin;

use pool_core::{HandlerError, Job};

/// Result type for job handlers.
pub type HandlerResult<V> = Result<V, HandlerError>;

/// Future type for async job handlers.
pub type HandlerFuture<V> = Pin<Box<dyn Future<Output = HandlerResult<V>> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how a job's payload turns into a value. Every
/// worker in a pool shares one handler, so implementations must be cheap to call
/// concurrently. Returning `Err` marks only that job as failed.
pub trait JobHandler<P, V>: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        "handler"
    }

    /// Process a job and return the result.
    fn handle(&self, job: Job<P>) -> HandlerFuture<V>;
}

/// A simple function-based job handler.
pub struct FnHandler<F> {
    name: String,
    handler: F,
}

impl<F> FnHandler<F> {
    /// Create a new function-based handler.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<P, V, F, Fut> JobHandler<P, V> for FnHandler<F>
where
    F: Fn(Job<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<V>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, job: Job<P>) -> HandlerFuture<V> {
        Box::pin((self.handler)(job))
    }
}
