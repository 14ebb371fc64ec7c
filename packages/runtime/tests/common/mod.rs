#![allow(dead_code)]

use std::time::Duration;

use pool_core::{HandlerError, Job, PoolConfig};
use pool_runtime::{FnHandler, JobHandler};

/// Returns the payload unchanged.
pub fn identity() -> impl JobHandler<u64, u64> {
    FnHandler::new("identity", |job: Job<u64>| async move {
        Ok::<_, HandlerError>(job.payload)
    })
}

/// Returns the payload after `latency`.
pub fn sleepy(latency: Duration) -> impl JobHandler<u64, u64> {
    FnHandler::new("sleepy", move |job: Job<u64>| async move {
        tokio::time::sleep(latency).await;
        Ok::<_, HandlerError>(job.payload)
    })
}

/// Fails every even payload, doubles the odd ones.
pub fn odd_only() -> impl JobHandler<u64, u64> {
    FnHandler::new("odd-only", |job: Job<u64>| async move {
        if job.payload % 2 == 0 {
            Err(HandlerError::failed(format!("{} is even", job.payload)))
        } else {
            Ok(job.payload * 2)
        }
    })
}

/// Panics on payload 3.
pub fn panics_on_three() -> impl JobHandler<u64, u64> {
    FnHandler::new("fragile", |job: Job<u64>| async move {
        if job.payload == 3 {
            panic!("cannot handle three");
        }
        Ok::<_, HandlerError>(job.payload)
    })
}

pub fn config(workers: usize, capacity: usize) -> PoolConfig {
    PoolConfig::new(workers)
        .with_job_capacity(capacity)
        .with_result_capacity(capacity)
}
