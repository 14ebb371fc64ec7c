mod common;

use std::error::Error;
use std::time::Duration;

use pool_core::{HandlerError, Job, JobId, Lifecycle, PoolConfig, PoolError, PoolEvent};
use pool_runtime::Supervisor;

#[tokio::test]
async fn identity_jobs_round_trip() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(2, 2), common::identity()).await?;
    supervisor.start().await?;

    for id in 1..=4 {
        supervisor.submit(Job::new(id, id)).await?;
    }
    let (report, collection) = supervisor.finish(4, Duration::from_secs(1)).await?;

    assert_eq!(report.processed, 4);
    assert_eq!(report.workers, 2);
    assert!(collection.is_complete());
    for id in 1..=4 {
        assert_eq!(collection.get(JobId(id)).and_then(|r| r.value()), Some(&id));
    }
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Stopped);

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn handler_failures_stay_per_job() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(3, 4), common::odd_only()).await?;
    supervisor.start().await?;

    for id in 1..=6 {
        supervisor.submit(Job::new(id, id)).await?;
    }
    let (report, collection) = supervisor.finish(6, Duration::from_secs(1)).await?;

    assert_eq!(report.failed, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(collection.len(), 6);
    assert_eq!(collection.failures().count(), 3);
    assert_eq!(
        collection.get(JobId(4)).and_then(|r| r.error()),
        Some(&HandlerError::Failed("4 is even".into()))
    );
    assert_eq!(collection.get(JobId(5)).and_then(|r| r.value()), Some(&10));

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn drain_then_collect_reaches_stopped() -> Result<(), Box<dyn Error>> {
    let config = common::config(2, 2).with_result_capacity(16);
    let supervisor = Supervisor::spawn(config, common::identity()).await?;
    supervisor.start().await?;

    for id in 1..=10 {
        supervisor.submit(Job::new(id, id)).await?;
    }
    let report = supervisor.close_and_drain().await?;
    assert_eq!(report.processed, 10);
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Draining);

    let results = supervisor.collect(10, Duration::from_secs(1)).await?.into_result()?;
    assert_eq!(results.len(), 10);
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Stopped);

    let again = supervisor.collect(1, Duration::ZERO).await;
    assert!(matches!(
        again,
        Err(PoolError::InvalidState {
            lifecycle: Lifecycle::Stopped,
            ..
        })
    ));

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn zero_deadline_after_drain_returns_every_buffered_result() -> Result<(), Box<dyn Error>> {
    let config = common::config(2, 2).with_result_capacity(16);
    let supervisor = Supervisor::spawn(config, common::identity()).await?;
    supervisor.start().await?;

    for id in 1..=4 {
        supervisor.submit(Job::new(id, id)).await?;
    }
    supervisor.close_and_drain().await?;

    let collection = supervisor.collect(4, Duration::ZERO).await?;
    assert!(collection.is_complete());
    assert_eq!(collection.len(), 4);
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Stopped);

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn early_collect_does_not_skip_results_submitted_later() -> Result<(), Box<dyn Error>> {
    let config = common::config(2, 2).with_result_capacity(16);
    let supervisor = Supervisor::spawn(config, common::identity()).await?;
    supervisor.start().await?;

    let early = supervisor.collect(2, Duration::ZERO).await?;
    assert_eq!(
        early.error(),
        Some(&PoolError::Timeout {
            expected: 2,
            received: 0
        })
    );

    supervisor.submit(Job::new(1, 1)).await?;
    supervisor.submit(Job::new(2, 2)).await?;
    supervisor.close_and_drain().await?;
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Draining);

    let collection = supervisor.collect(2, Duration::from_secs(1)).await?;
    assert!(collection.is_complete());
    assert_eq!(collection.get(JobId(2)).and_then(|r| r.value()), Some(&2));
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Stopped);

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn collect_finished_while_running_lets_drain_stop() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(2, 2), common::identity()).await?;
    supervisor.start().await?;

    for id in 1..=2 {
        supervisor.submit(Job::new(id, id)).await?;
    }
    let collection = supervisor.collect(2, Duration::from_secs(1)).await?;
    assert!(collection.is_complete());
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Running);

    supervisor.close_and_drain().await?;
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Stopped);

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn submit_after_drain_is_rejected() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(1, 1), common::identity()).await?;
    supervisor.start().await?;
    supervisor.close_and_drain().await?;

    assert_eq!(
        supervisor.submit(Job::new(1, 1)).await,
        Err(PoolError::QueueClosed)
    );
    assert!(matches!(
        supervisor.close_and_drain().await,
        Err(PoolError::InvalidState { .. })
    ));

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn zero_workers_is_invalid_config() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(PoolConfig::new(0), common::identity()).await?;

    assert!(matches!(
        supervisor.start().await,
        Err(PoolError::InvalidConfig(_))
    ));
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Created);

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn operations_require_a_started_pool() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(1, 1), common::identity()).await?;
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Created);

    assert_eq!(
        supervisor.submit(Job::new(1, 1)).await,
        Err(PoolError::InvalidState {
            operation: "submit",
            lifecycle: Lifecycle::Created
        })
    );
    assert!(matches!(
        supervisor.collect(1, Duration::ZERO).await,
        Err(PoolError::InvalidState { .. })
    ));

    supervisor.start().await?;
    assert_eq!(
        supervisor.start().await,
        Err(PoolError::InvalidState {
            operation: "start",
            lifecycle: Lifecycle::Running
        })
    );

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn zero_deadline_times_out_without_waiting() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(1, 1), common::identity()).await?;
    supervisor.start().await?;

    let started = std::time::Instant::now();
    let collection = supervisor.collect(1, Duration::ZERO).await?;

    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(
        collection.error(),
        Some(&PoolError::Timeout {
            expected: 1,
            received: 0
        })
    );
    // A returned collector does not stop a running pool.
    assert_eq!(supervisor.lifecycle().await?, Lifecycle::Running);

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn cancellation_interrupts_collection() -> Result<(), Box<dyn Error>> {
    let supervisor =
        Supervisor::spawn(common::config(1, 1), common::sleepy(Duration::from_secs(30))).await?;
    supervisor.start().await?;
    supervisor.submit(Job::new(1, 1)).await?;

    let token = supervisor.cancellation_token();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    let collection = supervisor.collect(1, Duration::from_secs(30)).await?;
    canceller.await?;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        collection.error(),
        Some(&PoolError::Cancelled {
            expected: 1,
            received: 0
        })
    );

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_job_ids_are_rejected() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(1, 4), common::identity()).await?;
    supervisor.start().await?;

    assert_eq!(supervisor.submit(Job::new(7, 1)).await?, JobId(7));
    assert_eq!(
        supervisor.submit(Job::new(7, 2)).await,
        Err(PoolError::DuplicateJob(JobId(7)))
    );

    let (_, collection) = supervisor.finish(1, Duration::from_secs(1)).await?;
    assert_eq!(collection.get(JobId(7)).and_then(|r| r.value()), Some(&1));

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn panics_and_timeouts_become_results() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(2, 4), common::panics_on_three()).await?;
    supervisor.start().await?;

    supervisor.submit(Job::new(1, 1)).await?;
    supervisor.submit(Job::new(3, 3)).await?;
    let (report, collection) = supervisor.finish(2, Duration::from_secs(1)).await?;

    assert_eq!(report.failed, 1);
    assert_eq!(collection.get(JobId(1)).and_then(|r| r.value()), Some(&1));
    assert_eq!(
        collection.get(JobId(3)).and_then(|r| r.error()),
        Some(&HandlerError::Panicked("cannot handle three".into()))
    );
    supervisor.shutdown().await?;

    let limit = Duration::from_millis(50);
    let supervisor =
        Supervisor::spawn(common::config(1, 1), common::sleepy(Duration::from_secs(30))).await?;
    supervisor.start().await?;
    supervisor.submit(Job::new(1, 1).with_timeout(limit)).await?;
    let (_, collection) = supervisor.finish(1, Duration::from_secs(5)).await?;

    assert_eq!(
        collection.get(JobId(1)).and_then(|r| r.error()),
        Some(&HandlerError::TimedOut(limit))
    );
    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn only_one_collector_at_a_time() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(1, 1), common::identity()).await?;
    supervisor.start().await?;

    let (first, second) = tokio::join!(
        supervisor.collect(1, Duration::from_millis(100)),
        supervisor.collect(1, Duration::from_millis(100))
    );

    assert!(first?.error().is_some_and(PoolError::is_partial));
    assert!(matches!(second, Err(PoolError::CollectorBusy)));

    // The lease is returned once the first collection ends.
    let third = supervisor.collect(1, Duration::ZERO).await?;
    assert!(!third.is_complete());

    supervisor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn lifecycle_and_job_events_are_broadcast() -> Result<(), Box<dyn Error>> {
    let supervisor = Supervisor::spawn(common::config(2, 2), common::identity()).await?;
    let mut events = supervisor.subscribe();
    let pool_id = supervisor.pool_id();

    supervisor.start().await?;
    for id in 1..=3 {
        supervisor.submit(Job::new(id, id)).await?;
    }
    supervisor.finish(3, Duration::from_secs(1)).await?;
    supervisor.shutdown().await?;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.pool_id(), pool_id);
        seen.push(event);
    }

    let transitions: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            PoolEvent::LifecycleChanged { new_state, .. } => Some(*new_state),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![Lifecycle::Running, Lifecycle::Draining, Lifecycle::Stopped]
    );

    let count = |pred: fn(&PoolEvent) -> bool| seen.iter().filter(|e| pred(e)).count();
    assert_eq!(count(|e| matches!(e, PoolEvent::PoolStarted { .. })), 1);
    assert_eq!(count(|e| matches!(e, PoolEvent::JobSubmitted { .. })), 3);
    assert_eq!(count(|e| matches!(e, PoolEvent::JobStarted { .. })), 3);
    assert_eq!(count(|e| matches!(e, PoolEvent::JobCompleted { .. })), 3);
    assert_eq!(count(|e| matches!(e, PoolEvent::QueueClosed { .. })), 1);
    assert_eq!(count(|e| matches!(e, PoolEvent::WorkerStopped { .. })), 2);
    Ok(())
}
