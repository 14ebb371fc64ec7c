//! Event types for observing a running pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, Lifecycle, PoolId, WorkerId};

/// Events emitted by the pool for subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    // Pool events
    /// Workers were spawned.
    PoolStarted {
        pool_id: PoolId,
        workers: usize,
        timestamp: DateTime<Utc>,
    },
    /// The supervisor moved to a new lifecycle state.
    LifecycleChanged {
        pool_id: PoolId,
        old_state: Lifecycle,
        new_state: Lifecycle,
        timestamp: DateTime<Utc>,
    },
    /// The job queue was closed; no further submissions are accepted.
    QueueClosed {
        pool_id: PoolId,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A job was accepted into the job queue.
    JobSubmitted {
        pool_id: PoolId,
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A worker took a job off the queue.
    JobStarted {
        pool_id: PoolId,
        job_id: JobId,
        worker_id: WorkerId,
        queued_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job's handler succeeded.
    JobCompleted {
        pool_id: PoolId,
        job_id: JobId,
        worker_id: WorkerId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job's handler failed.
    JobFailed {
        pool_id: PoolId,
        job_id: JobId,
        worker_id: WorkerId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A worker observed end-of-stream and exited.
    WorkerStopped {
        pool_id: PoolId,
        worker_id: WorkerId,
        processed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl PoolEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PoolEvent::PoolStarted { timestamp, .. } => *timestamp,
            PoolEvent::LifecycleChanged { timestamp, .. } => *timestamp,
            PoolEvent::QueueClosed { timestamp, .. } => *timestamp,
            PoolEvent::JobSubmitted { timestamp, .. } => *timestamp,
            PoolEvent::JobStarted { timestamp, .. } => *timestamp,
            PoolEvent::JobCompleted { timestamp, .. } => *timestamp,
            PoolEvent::JobFailed { timestamp, .. } => *timestamp,
            PoolEvent::WorkerStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the pool this event belongs to.
    pub fn pool_id(&self) -> PoolId {
        match self {
            PoolEvent::PoolStarted { pool_id, .. }
            | PoolEvent::LifecycleChanged { pool_id, .. }
            | PoolEvent::QueueClosed { pool_id, .. }
            | PoolEvent::JobSubmitted { pool_id, .. }
            | PoolEvent::JobStarted { pool_id, .. }
            | PoolEvent::JobCompleted { pool_id, .. }
            | PoolEvent::JobFailed { pool_id, .. }
            | PoolEvent::WorkerStopped { pool_id, .. } => *pool_id,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            PoolEvent::JobSubmitted { job_id, .. } => Some(*job_id),
            PoolEvent::JobStarted { job_id, .. } => Some(*job_id),
            PoolEvent::JobCompleted { job_id, .. } => Some(*job_id),
            PoolEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            PoolEvent::PoolStarted {
                pool_id, workers, ..
            } => format!("Pool {} started with {} workers", pool_id, workers),
            PoolEvent::LifecycleChanged {
                pool_id,
                old_state,
                new_state,
                ..
            } => format!("Pool {} {} -> {}", pool_id, old_state, new_state),
            PoolEvent::QueueClosed { pool_id, .. } => format!("Pool {} queue closed", pool_id),
            PoolEvent::JobSubmitted { job_id, .. } => format!("{} submitted", job_id),
            PoolEvent::JobStarted {
                job_id,
                worker_id,
                queued_ms,
                ..
            } => format!("{} started by {} after {}ms", job_id, worker_id, queued_ms),
            PoolEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("{} completed in {}ms", job_id, duration_ms),
            PoolEvent::JobFailed { job_id, error, .. } => {
                format!("{} failed: {}", job_id, error)
            }
            PoolEvent::WorkerStopped {
                worker_id,
                processed,
                ..
            } => format!("{} stopped after {} jobs", worker_id, processed),
        }
    }
}
