//! Job domain types for work items flowing through the pool.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for a job, chosen by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Identity of a worker within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Execution state of a single worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting on the job queue.
    #[default]
    Idle,
    /// Running the handler for exactly one job.
    Processing,
    /// Observed end-of-stream and exited.
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Processing => write!(f, "processing"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// A unit of work submitted for processing.
///
/// Jobs are immutable once submitted. Ownership moves from the producer into the
/// job queue and from there to exactly one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<P> {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Data handed to the handler.
    pub payload: P,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Optional limit on handler execution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl<P> Job<P> {
    /// Create a new job.
    pub fn new(id: impl Into<JobId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
            created_at: Utc::now(),
            timeout: None,
        }
    }

    /// Limit how long the handler may run for this job.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Failure captured from a handler while processing one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("{0}")]
    Failed(String),

    /// The handler panicked; the message is the panic payload when printable.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The job's timeout elapsed before the handler finished.
    #[error("handler timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from anything printable.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Outcome of processing one job. Always paired one-to-one with a [`Job`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult<V> {
    /// The job this result belongs to.
    pub job_id: JobId,
    /// The worker that produced it.
    pub worker_id: WorkerId,
    /// Handler value or the captured failure.
    pub outcome: Result<V, HandlerError>,
    /// Time spent inside the handler.
    pub elapsed: Duration,
}

impl<V> JobResult<V> {
    pub fn new(
        job_id: JobId,
        worker_id: WorkerId,
        outcome: Result<V, HandlerError>,
        elapsed: Duration,
    ) -> Self {
        Self {
            job_id,
            worker_id,
            outcome,
            elapsed,
        }
    }

    /// The handler value, if the job succeeded.
    pub fn value(&self) -> Option<&V> {
        self.outcome.as_ref().ok()
    }

    /// The captured failure, if the job failed.
    pub fn error(&self) -> Option<&HandlerError> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
