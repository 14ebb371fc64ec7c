//! Worker task that executes jobs.
//!
//! A worker is an independent task pulling from the shared job queue until it
//! observes end-of-stream. For every job it takes it pushes exactly one
//! [`JobResult`] onto the result queue, whether the handler succeeded, returned an
//! error, panicked or exceeded the job's timeout.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use pool_core::{HandlerError, Job, JobResult, PoolEvent, PoolId, WorkerId, WorkerState};
use tokio::time::Instant;

use crate::events::EventTx;
use crate::handler::JobHandler;
use crate::queue::BoundedQueue;

/// Everything a worker needs; owned by the worker task.
pub(crate) struct WorkerContext<P, V> {
    pub worker_id: WorkerId,
    pub pool_id: PoolId,
    pub jobs: BoundedQueue<Job<P>>,
    pub results: BoundedQueue<JobResult<V>>,
    pub handler: Arc<dyn JobHandler<P, V>>,
    pub events: EventTx,
}

/// Per-worker totals returned when the worker stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkerSummary {
    pub worker_id: WorkerId,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Main execution loop for a worker task.
///
/// Runs until the job queue is closed and drained. Handler failures never end the
/// loop.
pub(crate) async fn worker_loop<P, V>(ctx: WorkerContext<P, V>) -> WorkerSummary
where
    P: Send + 'static,
    V: Send + 'static,
{
    let WorkerContext {
        worker_id,
        pool_id,
        jobs,
        results,
        handler,
        events,
    } = ctx;

    let mut summary = WorkerSummary {
        worker_id,
        processed: 0,
        succeeded: 0,
        failed: 0,
    };
    tracing::debug!("Worker {} started ({})", worker_id, WorkerState::Idle);

    while let Some(job) = jobs.pop().await {
        let job_id = job.id;
        let waited = (Utc::now() - job.created_at).num_milliseconds();
        let queued_ms = u64::try_from(waited).unwrap_or(0);
        tracing::debug!(
            "{} picked up {} ({})",
            worker_id,
            job_id,
            WorkerState::Processing
        );
        events.emit(PoolEvent::JobStarted {
            pool_id,
            job_id,
            worker_id,
            queued_ms,
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let outcome = run_handler(handler.as_ref(), job).await;
        let elapsed = started.elapsed();

        summary.processed += 1;
        match &outcome {
            Ok(_) => {
                summary.succeeded += 1;
                events.emit(PoolEvent::JobCompleted {
                    pool_id,
                    job_id,
                    worker_id,
                    duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    timestamp: Utc::now(),
                });
            }
            Err(error) => {
                summary.failed += 1;
                tracing::debug!("{} failed on {}: {}", job_id, worker_id, error);
                events.emit(PoolEvent::JobFailed {
                    pool_id,
                    job_id,
                    worker_id,
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        let result = JobResult::new(job_id, worker_id, outcome, elapsed);
        if results.push(result).await.is_err() {
            tracing::error!(
                "Result queue closed before {} could report {}; result lost",
                worker_id,
                job_id
            );
        }
    }

    tracing::debug!(
        "Worker {} {} after {} jobs",
        worker_id,
        WorkerState::Stopped,
        summary.processed
    );
    events.emit(PoolEvent::WorkerStopped {
        pool_id,
        worker_id,
        processed: summary.processed,
        timestamp: Utc::now(),
    });

    summary
}

/// Run the handler for one job, turning panics and timeouts into [`HandlerError`]s.
async fn run_handler<P, V>(handler: &dyn JobHandler<P, V>, job: Job<P>) -> Result<V, HandlerError>
where
    P: Send + 'static,
    V: Send + 'static,
{
    let timeout = job.timeout;
    // Wrapping the call in the async block also catches panics raised while the
    // handler builds its future.
    let guarded = AssertUnwindSafe(async move { handler.handle(job).await }).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(caught) => caught,
            Err(_) => return Err(HandlerError::TimedOut(limit)),
        },
        None => guarded.await,
    };

    match caught {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!("Handler '{}' panicked: {}", handler.name(), message);
            Err(HandlerError::Panicked(message))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::time::Duration;

    use super::*;
    use crate::handler::FnHandler;

    fn context(
        handler: impl JobHandler<u32, u32>,
    ) -> (
        WorkerContext<u32, u32>,
        BoundedQueue<Job<u32>>,
        BoundedQueue<JobResult<u32>>,
    ) {
        let jobs = BoundedQueue::new(8);
        let results = BoundedQueue::new(8);
        let ctx = WorkerContext {
            worker_id: WorkerId(0),
            pool_id: PoolId::new(),
            jobs: jobs.clone(),
            results: results.clone(),
            handler: Arc::new(handler),
            events: EventTx::default(),
        };
        (ctx, jobs, results)
    }

    #[tokio::test(start_paused = true)]
    async fn captures_errors_panics_and_timeouts() -> Result<(), Box<dyn Error>> {
        let handler = FnHandler::new("mixed", |job: Job<u32>| async move {
            match job.payload {
                1 => Ok(1),
                2 => Err(HandlerError::failed("rejected")),
                3 => panic!("boom"),
                _ => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(job.payload)
                }
            }
        });
        let (ctx, jobs, results) = context(handler);
        let worker = tokio::spawn(worker_loop(ctx));

        jobs.push(Job::new(1, 1)).await?;
        jobs.push(Job::new(2, 2)).await?;
        jobs.push(Job::new(3, 3)).await?;
        jobs.push(Job::new(4, 4).with_timeout(Duration::from_millis(100))).await?;
        jobs.close();

        let summary = worker.await?;
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 3);

        let mut outcomes = Vec::new();
        results.close();
        while let Some(result) = results.pop().await {
            outcomes.push(result.outcome);
        }
        assert_eq!(
            outcomes,
            vec![
                Ok(1),
                Err(HandlerError::Failed("rejected".into())),
                Err(HandlerError::Panicked("boom".into())),
                Err(HandlerError::TimedOut(Duration::from_millis(100))),
            ]
        );
        Ok(())
    }
}
