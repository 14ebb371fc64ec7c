//! Fixed-size pool of workers sharing one job queue.

use std::sync::Arc;

use chrono::Utc;
use pool_core::{
    ClosedQueueError, DrainReport, Job, JobResult, PoolConfig, PoolError, PoolEvent, PoolId,
    WorkerId,
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::events::EventTx;
use crate::handler::JobHandler;
use crate::queue::BoundedQueue;
use crate::worker::{WorkerContext, WorkerSummary, worker_loop};

/// Owns a fixed set of workers, the job queue they consume and the result queue
/// they produce into.
///
/// The worker count never changes after [`WorkerPool::start`]. The pool ends with
/// [`WorkerPool::close_and_drain`], which consumes it.
pub struct WorkerPool<P, V> {
    id: PoolId,
    jobs: BoundedQueue<Job<P>>,
    results: BoundedQueue<JobResult<V>>,
    workers: JoinSet<WorkerSummary>,
    worker_count: usize,
    events: EventTx,
}

impl<P, V> WorkerPool<P, V>
where
    P: Send + 'static,
    V: Send + 'static,
{
    /// Spawn `config.workers` workers and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`PoolError::InvalidConfig`] when the worker count is zero.
    pub fn start(
        config: &PoolConfig,
        handler: Arc<dyn JobHandler<P, V>>,
    ) -> Result<Self, PoolError> {
        Self::start_with_id(PoolId::new(), config, handler, EventTx::default())
    }

    /// Like [`WorkerPool::start`], broadcasting [`PoolEvent`]s to `event_tx`.
    pub fn start_with_events(
        config: &PoolConfig,
        handler: Arc<dyn JobHandler<P, V>>,
        event_tx: broadcast::Sender<PoolEvent>,
    ) -> Result<Self, PoolError> {
        Self::start_with_id(PoolId::new(), config, handler, EventTx::new(event_tx))
    }

    pub(crate) fn start_with_id(
        id: PoolId,
        config: &PoolConfig,
        handler: Arc<dyn JobHandler<P, V>>,
        events: EventTx,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        let jobs = BoundedQueue::new(config.job_capacity);
        let results = BoundedQueue::new(config.result_capacity);
        let mut workers = JoinSet::new();

        for n in 0..config.workers {
            let ctx = WorkerContext {
                worker_id: WorkerId(n + 1),
                pool_id: id,
                jobs: jobs.clone(),
                results: results.clone(),
                handler: Arc::clone(&handler),
                events: events.clone(),
            };
            workers.spawn(worker_loop(ctx));
        }

        tracing::info!(
            "Started pool {} with {} workers running '{}'",
            id,
            config.workers,
            handler.name()
        );
        events.emit(PoolEvent::PoolStarted {
            pool_id: id,
            workers: config.workers,
            timestamp: Utc::now(),
        });

        Ok(Self {
            id,
            jobs,
            results,
            workers,
            worker_count: config.workers,
            events,
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Handle to the job queue, for producers that push directly.
    pub fn job_queue(&self) -> BoundedQueue<Job<P>> {
        self.jobs.clone()
    }

    /// Handle to the result queue. It is closed once every worker has stopped.
    pub fn result_queue(&self) -> BoundedQueue<JobResult<V>> {
        self.results.clone()
    }

    /// Enqueue a job, waiting while the job queue is full.
    pub async fn submit(&self, job: Job<P>) -> Result<(), ClosedQueueError<Job<P>>> {
        self.jobs.push(job).await
    }

    /// Close the job queue and wait for every worker to stop.
    ///
    /// Jobs already buffered when the queue closes are still processed, so every job
    /// that was pushed successfully yields exactly one result. The result queue is
    /// closed afterwards so collectors observe end-of-stream.
    ///
    /// Results stay in the result queue until collected: if nobody collects
    /// concurrently, `result_capacity` must cover every outstanding job or workers
    /// will wait on a full result queue.
    pub async fn close_and_drain(mut self) -> DrainReport {
        if self.jobs.close() {
            tracing::info!("Pool {} closed its job queue; draining", self.id);
            self.events.emit(PoolEvent::QueueClosed {
                pool_id: self.id,
                timestamp: Utc::now(),
            });
        }

        let mut report = DrainReport::default();
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(summary) => {
                    tracing::debug!(
                        "Pool {} joined {} ({} ok, {} failed)",
                        self.id,
                        summary.worker_id,
                        summary.succeeded,
                        summary.failed
                    );
                    report.workers += 1;
                    report.processed += summary.processed;
                    report.succeeded += summary.succeeded;
                    report.failed += summary.failed;
                }
                Err(e) => {
                    tracing::error!("Worker task in pool {} ended abnormally: {}", self.id, e);
                }
            }
        }

        self.results.close();
        tracing::info!(
            "Pool {} drained: {} workers, {} jobs ({} failed)",
            self.id,
            report.workers,
            report.processed,
            report.failed
        );
        report
    }
}
