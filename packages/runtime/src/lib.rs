//! Concurrency runtime for the worker pool.
//!
//! This crate provides the queues, workers and Ractor-based supervisor that turn
//! a stream of submitted jobs into a collected set of results.
//!
//! # Architecture
//!
//! - `BoundedQueue` - FIFO hand-off with capacity, backpressure and close
//! - `WorkerPool` - Fixed set of worker tasks sharing one job queue
//! - `Multiplexer` - Wait-any over result streams, timers and a cancellation token
//! - `ResultCollector` - Gathers results until a count, deadline or cancellation
//! - `Supervisor` - Actor walking a pool through Created, Running, Draining, Stopped
//!
//! # Usage
//!
//! ```ignore
//! use pool_runtime::{FnHandler, Supervisor};
//! use pool_core::{Job, PoolConfig};
//!
//! let handler = FnHandler::new("double", |job: Job<u64>| async move { Ok(job.payload * 2) });
//! let supervisor = Supervisor::spawn(PoolConfig::new(2), handler).await?;
//! supervisor.start().await?;
//! supervisor.submit(Job::new(1, 21)).await?;
//! let (report, results) = supervisor.finish(1, Duration::from_secs(1)).await?;
//! supervisor.shutdown().await?;
//! ```

mod collector;
mod events;
mod handler;
mod messages;
mod multiplexer;
mod pool;
mod queue;
mod supervisor;
mod worker;

pub use collector::{Collection, ResultCollector};
pub use events::EVENT_BUFFER;
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler};
pub use messages::{CollectorLease, SupervisorMessage};
pub use multiplexer::{Multiplexer, Ready, SourceId};
pub use pool::WorkerPool;
pub use queue::BoundedQueue;
pub use supervisor::{Supervisor, SupervisorActor, SupervisorArgs, SupervisorState};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
/// Re-export of the cancellation token accepted by collectors and multiplexers.
pub use tokio_util::sync::CancellationToken;
