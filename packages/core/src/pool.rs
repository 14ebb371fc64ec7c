//! Pool domain types: identity, lifecycle, configuration and drain reports.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::PoolError;

/// Unique identifier for a pool, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub Ulid);

impl PoolId {
    /// Create a new unique pool ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a pool ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supervisor lifecycle. Transitions only move forward, one step at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Constructed, workers not yet spawned.
    #[default]
    Created,
    /// Workers running, submissions accepted.
    Running,
    /// Input closed, waiting for workers and the collector to finish.
    Draining,
    /// Terminal.
    Stopped,
}

impl Lifecycle {
    /// The only state reachable from this one, if any.
    pub fn next(self) -> Option<Lifecycle> {
        match self {
            Lifecycle::Created => Some(Lifecycle::Running),
            Lifecycle::Running => Some(Lifecycle::Draining),
            Lifecycle::Draining => Some(Lifecycle::Stopped),
            Lifecycle::Stopped => None,
        }
    }

    /// Check whether moving to `to` is a legal single-step transition.
    pub fn can_transition_to(self, to: Lifecycle) -> bool {
        self.next() == Some(to)
    }

    /// Check if submissions are accepted in this state.
    pub fn accepts_jobs(self) -> bool {
        matches!(self, Lifecycle::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Stopped)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Created => write!(f, "created"),
            Lifecycle::Running => write!(f, "running"),
            Lifecycle::Draining => write!(f, "draining"),
            Lifecycle::Stopped => write!(f, "stopped"),
        }
    }
}

/// Configuration for pool behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrent workers. Must be positive.
    pub workers: usize,
    /// Job queue capacity; 0 means synchronous hand-off.
    pub job_capacity: usize,
    /// Result queue capacity; 0 means synchronous hand-off.
    pub result_capacity: usize,
    /// Default collection deadline in milliseconds.
    pub collect_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            job_capacity: 64,
            result_capacity: 1024,
            collect_timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    /// Create a config with the given worker count and default capacities.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Set the job queue capacity.
    pub fn with_job_capacity(mut self, capacity: usize) -> Self {
        self.job_capacity = capacity;
        self
    }

    /// Set the result queue capacity.
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    /// Set the default collection deadline.
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    /// Reject configurations the pool cannot start with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "worker count must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a config from environment variables.
    ///
    /// - `POOL_WORKERS` (default: 4)
    /// - `POOL_JOB_CAPACITY` (default: 64)
    /// - `POOL_RESULT_CAPACITY` (default: 1024)
    /// - `POOL_COLLECT_TIMEOUT_MS` (default: 30000)
    ///
    /// Unset or empty variables keep their defaults; anything unparsable is an error.
    pub fn from_env() -> Result<Self, PoolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, using the `POOL_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PoolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            workers: read_var(&lookup, "POOL_WORKERS")?.unwrap_or(defaults.workers),
            job_capacity: read_var(&lookup, "POOL_JOB_CAPACITY")?
                .unwrap_or(defaults.job_capacity),
            result_capacity: read_var(&lookup, "POOL_RESULT_CAPACITY")?
                .unwrap_or(defaults.result_capacity),
            collect_timeout_ms: read_var(&lookup, "POOL_COLLECT_TIMEOUT_MS")?
                .unwrap_or(defaults.collect_timeout_ms),
        };
        Ok(config)
    }
}

fn read_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, PoolError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key).map(|v| v.trim().to_string()) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| PoolError::InvalidConfig(format!("{key}={raw} is not a non-negative integer")))
}

/// Read one numeric environment variable with the same rules as
/// [`PoolConfig::from_env`]: unset or blank is `None`, anything unparsable is
/// [`PoolError::InvalidConfig`].
pub fn env_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>, PoolError> {
    read_var(&|name: &str| std::env::var(name).ok(), key)
}

/// Totals reported once every worker has stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainReport {
    /// Workers that stopped cleanly.
    pub workers: usize,
    /// Jobs taken from the queue.
    pub processed: u64,
    /// Jobs whose handler succeeded.
    pub succeeded: u64,
    /// Jobs whose handler failed, panicked or timed out.
    pub failed: u64,
}

impl DrainReport {
    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        if self.processed == 0 {
            None
        } else {
            Some((self.succeeded as f64 / self.processed as f64) * 100.0)
        }
    }
}
