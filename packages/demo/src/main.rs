//! Fan-out/fan-in demo: a pool of workers doubles every submitted number.

use std::time::Duration;

use pool_core::{HandlerError, Job, PoolConfig, PoolError, env_var};
use pool_runtime::{FnHandler, Supervisor};
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_JOBS: u64 = 5;
const DEFAULT_LATENCY_MS: u64 = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let config = PoolConfig::from_env()?;
    let jobs = env_var("DEMO_JOBS")?.unwrap_or(DEFAULT_JOBS);
    let latency = Duration::from_millis(env_var("DEMO_LATENCY_MS")?.unwrap_or(DEFAULT_LATENCY_MS));
    tracing::info!(
        "Running {} jobs on {} workers (job capacity {}, result capacity {})",
        jobs,
        config.workers,
        config.job_capacity,
        config.result_capacity
    );

    let handler = FnHandler::new("double", move |job: Job<u64>| async move {
        tokio::time::sleep(latency).await;
        Ok::<_, HandlerError>(job.payload * 2)
    });
    let supervisor = Supervisor::spawn(config, handler).await?;

    let mut events = supervisor.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    tracing::debug!("{} {}", event.description(), json);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    supervisor.start().await?;

    // Collect while submitting so the result queue never has to hold every result.
    let deadline = supervisor.collect_timeout();
    let (submitted, finished) = tokio::join!(
        async {
            for n in 1..=jobs {
                supervisor.submit(Job::new(n, n)).await?;
            }
            tracing::info!("Submitted {} jobs", jobs);
            Ok::<_, PoolError>(supervisor.close_and_drain().await?)
        },
        supervisor.collect(jobs as usize, deadline)
    );
    let report = submitted?;
    let collection = finished?;

    for result in collection.iter() {
        match &result.outcome {
            Ok(value) => tracing::info!(
                "{} -> {} on {} in {:?}",
                result.job_id,
                value,
                result.worker_id,
                result.elapsed
            ),
            Err(e) => tracing::warn!("{} failed on {}: {}", result.job_id, result.worker_id, e),
        }
    }
    tracing::info!(
        "Drained {} workers: {} processed, {:.1}% succeeded",
        report.workers,
        report.processed,
        report.success_rate().unwrap_or(100.0)
    );

    let status = collection.into_result();
    supervisor.shutdown().await?;
    printer.await?;
    status?;
    Ok(())
}
