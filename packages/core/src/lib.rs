//! Core domain types for the worker pool.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobResult and HandlerError for work items and their outcomes
//! - PoolConfig, Lifecycle and DrainReport for pool control
//! - PoolError and ClosedQueueError for failures
//! - PoolEvent for observing a running pool

mod error;
mod events;
mod job;
mod pool;

pub use error::{ClosedQueueError, PoolError, PoolResult};
pub use events::PoolEvent;
pub use job::{HandlerError, Job, JobId, JobResult, WorkerId, WorkerState};
pub use pool::{DrainReport, Lifecycle, PoolConfig, PoolId, env_var};
