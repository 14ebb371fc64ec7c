//! Message types for the supervisor actor.

use std::collections::HashSet;

use pool_core::{DrainReport, Job, JobId, JobResult, Lifecycle, PoolError};
use ractor::RpcReplyPort;
use tokio_util::sync::CancellationToken;

use crate::queue::BoundedQueue;

/// Messages for the SupervisorActor.
#[derive(Debug)]
pub enum SupervisorMessage<P, V> {
    /// Spawn the worker pool.
    Start {
        reply: RpcReplyPort<Result<(), PoolError>>,
    },

    /// Enqueue a job. Replies once the job is in the queue.
    Submit {
        job: Box<Job<P>>,
        reply: RpcReplyPort<Result<JobId, PoolError>>,
    },

    /// Close the job queue and wait for every worker to stop.
    CloseAndDrain {
        reply: RpcReplyPort<Result<DrainReport, PoolError>>,
    },

    /// Sent by the drain task once every worker has stopped.
    Drained {
        report: DrainReport,
        reply: RpcReplyPort<Result<DrainReport, PoolError>>,
    },

    /// Borrow the result queue for one collection.
    OpenCollector {
        reply: RpcReplyPort<Result<CollectorLease<V>, PoolError>>,
    },

    /// A collection opened with `OpenCollector` finished.
    CollectorReturned,

    /// Get the current lifecycle state.
    GetLifecycle { reply: RpcReplyPort<Lifecycle> },

    /// Cancel outstanding waits and stop the actor.
    Shutdown,
}

/// What a caller needs to run a collection outside the actor.
#[derive(Debug)]
pub struct CollectorLease<V> {
    pub results: BoundedQueue<JobResult<V>>,
    pub cancel: CancellationToken,
    /// Every submitted id, once submission is over.
    pub known_jobs: Option<HashSet<JobId>>,
}
