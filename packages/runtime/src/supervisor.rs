//! Supervisor actor owning a pool's lifecycle.
//!
//! The actor serializes every lifecycle decision: starting the pool, accepting
//! submissions, closing input and handing out the result queue. Anything that can
//! wait (queue pushes, worker draining, collection) runs outside the actor so the
//! mailbox keeps moving; the drain task reports back with a message.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pool_core::{
    DrainReport, Job, JobId, JobResult, Lifecycle, PoolConfig, PoolError, PoolEvent, PoolId,
};
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::collector::{Collection, ResultCollector};
use crate::events::{EVENT_BUFFER, EventTx};
use crate::handler::JobHandler;
use crate::messages::{CollectorLease, SupervisorMessage};
use crate::pool::WorkerPool;
use crate::queue::BoundedQueue;

/// Arguments for spawning a [`SupervisorActor`].
pub struct SupervisorArgs<P, V> {
    pub pool_id: PoolId,
    pub config: PoolConfig,
    pub handler: Arc<dyn JobHandler<P, V>>,
    pub cancel: CancellationToken,
    pub event_tx: broadcast::Sender<PoolEvent>,
}

/// State for the supervisor actor.
pub struct SupervisorState<P, V> {
    pool_id: PoolId,
    config: PoolConfig,
    lifecycle: Lifecycle,
    handler: Arc<dyn JobHandler<P, V>>,
    /// Present while running; moved into the drain task on close.
    pool: Option<WorkerPool<P, V>>,
    jobs: Option<BoundedQueue<Job<P>>>,
    results: Option<BoundedQueue<JobResult<V>>>,
    submitted: HashSet<JobId>,
    drain_report: Option<DrainReport>,
    collecting: bool,
    /// A collector returned after input closed.
    collected: bool,
    /// A collector returned while the pool was still running.
    collected_early: bool,
    cancel: CancellationToken,
    events: EventTx,
}

impl<P, V> SupervisorState<P, V> {
    fn new(args: SupervisorArgs<P, V>) -> Self {
        Self {
            pool_id: args.pool_id,
            config: args.config,
            lifecycle: Lifecycle::Created,
            handler: args.handler,
            pool: None,
            jobs: None,
            results: None,
            submitted: HashSet::new(),
            drain_report: None,
            collecting: false,
            collected: false,
            collected_early: false,
            cancel: args.cancel,
            events: EventTx::new(args.event_tx),
        }
    }

    fn transition(&mut self, next: Lifecycle) {
        let old = self.lifecycle;
        if !old.can_transition_to(next) {
            tracing::error!("Pool {} refused transition {} -> {}", self.pool_id, old, next);
            return;
        }
        self.lifecycle = next;
        tracing::info!("Pool {} is now {} (was {})", self.pool_id, next, old);
        self.events.emit(PoolEvent::LifecycleChanged {
            pool_id: self.pool_id,
            old_state: old,
            new_state: next,
            timestamp: Utc::now(),
        });
    }

    /// Stop once the workers are gone and the results have been collected.
    ///
    /// A collector that returned before input closed only counts when it left
    /// nothing behind in the result queue.
    fn stop_if_finished(&mut self) {
        if self.lifecycle != Lifecycle::Draining || self.drain_report.is_none() || self.collecting {
            return;
        }
        let nothing_left = self.results.as_ref().is_none_or(BoundedQueue::is_empty);
        if self.collected || (self.collected_early && nothing_left) {
            self.transition(Lifecycle::Stopped);
        }
    }

    fn invalid(&self, operation: &'static str) -> PoolError {
        PoolError::InvalidState {
            operation,
            lifecycle: self.lifecycle,
        }
    }
}

/// Actor that owns one [`WorkerPool`] and walks it through its [`Lifecycle`].
pub struct SupervisorActor<P, V> {
    _marker: PhantomData<fn() -> (P, V)>,
}

impl<P, V> Default for SupervisorActor<P, V> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<P, V> Actor for SupervisorActor<P, V>
where
    P: Send + 'static,
    V: Send + 'static,
{
    type Msg = SupervisorMessage<P, V>;
    type State = SupervisorState<P, V>;
    type Arguments = SupervisorArgs<P, V>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting supervisor for pool {} ({} workers)",
            args.pool_id,
            args.config.workers
        );
        Ok(SupervisorState::new(args))
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Supervisor for pool {} stopped while {}",
            state.pool_id,
            state.lifecycle
        );
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Start { reply } => {
                if state.lifecycle != Lifecycle::Created {
                    let _ = reply.send(Err(state.invalid("start")));
                    return Ok(());
                }

                let started = WorkerPool::start_with_id(
                    state.pool_id,
                    &state.config,
                    Arc::clone(&state.handler),
                    state.events.clone(),
                );
                match started {
                    Ok(pool) => {
                        state.jobs = Some(pool.job_queue());
                        state.results = Some(pool.result_queue());
                        state.pool = Some(pool);
                        state.transition(Lifecycle::Running);
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        tracing::warn!("Pool {} failed to start: {}", state.pool_id, e);
                        let _ = reply.send(Err(e));
                    }
                }
            }

            SupervisorMessage::Submit { job, reply } => {
                let jobs = match (state.lifecycle, &state.jobs) {
                    (Lifecycle::Running, Some(jobs)) => jobs.clone(),
                    (Lifecycle::Created, _) => {
                        let _ = reply.send(Err(state.invalid("submit")));
                        return Ok(());
                    }
                    _ => {
                        let _ = reply.send(Err(PoolError::QueueClosed));
                        return Ok(());
                    }
                };

                let job_id = job.id;
                if !state.submitted.insert(job_id) {
                    let _ = reply.send(Err(PoolError::DuplicateJob(job_id)));
                    return Ok(());
                }

                // A full queue must not block the mailbox.
                let pool_id = state.pool_id;
                let events = state.events.clone();
                tokio::spawn(async move {
                    let pushed = jobs.push(*job).await;
                    if pushed.is_ok() {
                        tracing::debug!("Pool {} accepted {}", pool_id, job_id);
                        events.emit(PoolEvent::JobSubmitted {
                            pool_id,
                            job_id,
                            timestamp: Utc::now(),
                        });
                    }
                    let _ = reply.send(pushed.map(|()| job_id).map_err(PoolError::from));
                });
            }

            SupervisorMessage::CloseAndDrain { reply } => {
                let pool = match (state.lifecycle, state.pool.take()) {
                    (Lifecycle::Running, Some(pool)) => pool,
                    (_, pool) => {
                        state.pool = pool;
                        let _ = reply.send(Err(state.invalid("close and drain")));
                        return Ok(());
                    }
                };

                state.transition(Lifecycle::Draining);
                let pool_id = state.pool_id;
                tokio::spawn(async move {
                    let report = pool.close_and_drain().await;
                    if myself
                        .send_message(SupervisorMessage::Drained { report, reply })
                        .is_err()
                    {
                        tracing::warn!("Pool {} drained after its supervisor stopped", pool_id);
                    }
                });
            }

            SupervisorMessage::Drained { report, reply } => {
                state.drain_report = Some(report);
                let _ = reply.send(Ok(report));
                state.stop_if_finished();
            }

            SupervisorMessage::OpenCollector { reply } => {
                let results = match (state.lifecycle, &state.results) {
                    (Lifecycle::Running | Lifecycle::Draining, Some(results)) => results.clone(),
                    _ => {
                        let _ = reply.send(Err(state.invalid("collect")));
                        return Ok(());
                    }
                };
                if state.collecting {
                    let _ = reply.send(Err(PoolError::CollectorBusy));
                    return Ok(());
                }

                state.collecting = true;
                let known_jobs =
                    (state.lifecycle == Lifecycle::Draining).then(|| state.submitted.clone());
                let _ = reply.send(Ok(CollectorLease {
                    results,
                    cancel: state.cancel.clone(),
                    known_jobs,
                }));
            }

            SupervisorMessage::CollectorReturned => {
                state.collecting = false;
                if state.lifecycle != Lifecycle::Draining {
                    state.collected_early = true;
                    return Ok(());
                }
                state.collected = true;
                if state.drain_report.is_none() {
                    // Nobody reads the results any more; let blocked workers finish.
                    if let Some(results) = &state.results
                        && results.close()
                        && !results.is_empty()
                    {
                        tracing::warn!(
                            "Pool {} closed its result queue with {} uncollected results",
                            state.pool_id,
                            results.len()
                        );
                    }
                }
                state.stop_if_finished();
            }

            SupervisorMessage::GetLifecycle { reply } => {
                let _ = reply.send(state.lifecycle);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor for pool {}", state.pool_id);
                state.cancel.cancel();
                if let Some(jobs) = &state.jobs {
                    jobs.close();
                }
                if let Some(results) = &state.results {
                    results.close();
                }
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Handle to a running [`SupervisorActor`].
///
/// Every method talks to the actor through its mailbox, so the handle can be
/// shared by reference across concurrent tasks. Call [`Supervisor::shutdown`] when
/// done; dropping the handle leaves the actor running.
pub struct Supervisor<P, V> {
    pool_id: PoolId,
    actor: ActorRef<SupervisorMessage<P, V>>,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<PoolEvent>,
    collect_timeout: Duration,
}

impl<P, V> Supervisor<P, V>
where
    P: Send + 'static,
    V: Send + 'static,
{
    /// Spawn the supervisor actor in [`Lifecycle::Created`]. Workers are spawned and
    /// the configuration validated by [`Supervisor::start`].
    pub async fn spawn(
        config: PoolConfig,
        handler: impl JobHandler<P, V>,
    ) -> Result<Self, PoolError> {
        Self::spawn_shared(config, Arc::new(handler)).await
    }

    /// Like [`Supervisor::spawn`] with a handler shared elsewhere.
    pub async fn spawn_shared(
        config: PoolConfig,
        handler: Arc<dyn JobHandler<P, V>>,
    ) -> Result<Self, PoolError> {
        let pool_id = PoolId::new();
        let cancel = CancellationToken::new();
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let collect_timeout = config.collect_timeout();
        let args = SupervisorArgs {
            pool_id,
            config,
            handler,
            cancel: cancel.clone(),
            event_tx: event_tx.clone(),
        };

        let (actor, handle) = Actor::spawn(
            Some(format!("supervisor-{pool_id}")),
            SupervisorActor::default(),
            args,
        )
        .await
        .map_err(|e| PoolError::Supervisor(format!("failed to spawn supervisor: {e}")))?;

        Ok(Self {
            pool_id,
            actor,
            handle,
            cancel,
            event_tx,
            collect_timeout,
        })
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Deadline configured through [`PoolConfig::collect_timeout`].
    pub fn collect_timeout(&self) -> Duration {
        self.collect_timeout
    }

    /// Subscribe to pool events. Only events sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    /// Token that interrupts every collection on this pool.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Interrupt any running collection with [`PoolError::Cancelled`]. Running
    /// handlers are not interrupted.
    pub fn cancel(&self) {
        tracing::info!("Cancelling collection for pool {}", self.pool_id);
        self.cancel.cancel();
    }

    /// Spawn the workers and move to [`Lifecycle::Running`]. An invalid
    /// configuration fails with [`PoolError::InvalidConfig`] and leaves the pool in
    /// [`Lifecycle::Created`].
    pub async fn start(&self) -> Result<(), PoolError> {
        self.call(|reply| SupervisorMessage::Start { reply }).await?
    }

    /// Enqueue a job, waiting while the job queue is full.
    pub async fn submit(&self, job: Job<P>) -> Result<JobId, PoolError> {
        self.call(|reply| SupervisorMessage::Submit {
            job: Box::new(job),
            reply,
        })
        .await?
    }

    /// Close input and wait for every worker to stop.
    ///
    /// Results stay queued until collected. When nothing collects concurrently the
    /// result queue must hold every outstanding result; [`Supervisor::finish`]
    /// avoids that constraint.
    pub async fn close_and_drain(&self) -> Result<DrainReport, PoolError> {
        self.call(|reply| SupervisorMessage::CloseAndDrain { reply })
            .await?
    }

    /// Collect `expected` results within `deadline`.
    ///
    /// Partial outcomes (timeout, cancellation, early end of results) are reported
    /// through [`Collection::error`] alongside whatever arrived. Only one
    /// collection may run at a time.
    pub async fn collect(
        &self,
        expected: usize,
        deadline: Duration,
    ) -> Result<Collection<V>, PoolError> {
        let lease = self
            .call(|reply| SupervisorMessage::OpenCollector { reply })
            .await??;
        let _returned = LeaseGuard(&self.actor);

        let mut collector = ResultCollector::new(lease.results).with_cancellation(lease.cancel);
        if let Some(ids) = lease.known_jobs {
            collector = collector.with_known_jobs(ids);
        }
        Ok(collector.collect(expected, deadline).await)
    }

    /// Close input and collect `expected` results concurrently, then report both.
    pub async fn finish(
        &self,
        expected: usize,
        deadline: Duration,
    ) -> Result<(DrainReport, Collection<V>), PoolError> {
        let (drained, collected) =
            tokio::join!(self.close_and_drain(), self.collect(expected, deadline));
        Ok((drained?, collected?))
    }

    pub async fn lifecycle(&self) -> Result<Lifecycle, PoolError> {
        self.call(|reply| SupervisorMessage::GetLifecycle { reply })
            .await
    }

    /// Stop the actor and wait for it to exit. Queues are closed and outstanding
    /// collections cancelled.
    pub async fn shutdown(self) -> Result<(), PoolError> {
        self.actor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|_| self.unavailable())?;
        self.handle
            .await
            .map_err(|e| PoolError::Supervisor(format!("supervisor task failed: {e}")))
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> SupervisorMessage<P, V>,
    ) -> Result<T, PoolError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> PoolError {
        PoolError::Supervisor(format!("supervisor for pool {} is not running", self.pool_id))
    }
}

/// Hands the result queue back when a collection ends or is dropped.
struct LeaseGuard<'a, P: Send + 'static, V: Send + 'static>(
    &'a ActorRef<SupervisorMessage<P, V>>,
);

impl<P: Send + 'static, V: Send + 'static> Drop for LeaseGuard<'_, P, V> {
    fn drop(&mut self) {
        let _ = self.0.send_message(SupervisorMessage::CollectorReturned);
    }
}
