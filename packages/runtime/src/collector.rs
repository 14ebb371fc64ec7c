//! Gathers job results until an expected count, a deadline or cancellation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures_util::stream;
use pool_core::{JobId, JobResult, PoolError};
use tokio_util::sync::CancellationToken;

use crate::multiplexer::{Multiplexer, Ready};
use crate::queue::BoundedQueue;

/// Results gathered by one [`ResultCollector::collect`] call.
///
/// Results are always kept, even when collection stopped early: `status` says why
/// it stopped and the partial set is still valid.
#[derive(Debug)]
pub struct Collection<V> {
    results: HashMap<JobId, JobResult<V>>,
    arrival: Vec<JobId>,
    expected: usize,
    status: Result<(), PoolError>,
}

impl<V> Collection<V> {
    fn new(expected: usize) -> Self {
        Self {
            results: HashMap::with_capacity(expected),
            arrival: Vec::with_capacity(expected),
            expected,
            status: Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn get(&self, job_id: JobId) -> Option<&JobResult<V>> {
        self.results.get(&job_id)
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.results.contains_key(&job_id)
    }

    /// Results in the order they arrived.
    pub fn iter(&self) -> impl Iterator<Item = &JobResult<V>> {
        self.arrival.iter().filter_map(|id| self.results.get(id))
    }

    /// Why collection stopped early, if it did.
    pub fn error(&self) -> Option<&PoolError> {
        self.status.as_ref().err()
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_ok()
    }

    /// Results whose handler failed.
    pub fn failures(&self) -> impl Iterator<Item = &JobResult<V>> {
        self.iter().filter(|r| !r.is_success())
    }

    pub fn into_results(self) -> HashMap<JobId, JobResult<V>> {
        self.results
    }

    /// The full result map on success, the stop reason otherwise.
    pub fn into_result(self) -> Result<HashMap<JobId, JobResult<V>>, PoolError> {
        self.status.map(|()| self.results)
    }

    pub fn into_parts(self) -> (HashMap<JobId, JobResult<V>>, Result<(), PoolError>) {
        (self.results, self.status)
    }

    fn accept(&mut self, result: JobResult<V>) -> Result<(), PoolError> {
        let job_id = result.job_id;
        if self.results.contains_key(&job_id) {
            return Err(PoolError::DuplicateResult(job_id));
        }
        self.arrival.push(job_id);
        self.results.insert(job_id, result);
        Ok(())
    }
}

/// Consumes a result queue through a [`Multiplexer`] with a deadline timer and an
/// optional cancellation token.
#[derive(Debug, Clone)]
pub struct ResultCollector<V> {
    results: BoundedQueue<JobResult<V>>,
    cancel: Option<CancellationToken>,
    known: Option<HashSet<JobId>>,
}

impl<V> ResultCollector<V>
where
    V: Send + 'static,
{
    pub fn new(results: BoundedQueue<JobResult<V>>) -> Self {
        Self {
            results,
            cancel: None,
            known: None,
        }
    }

    /// Stop with [`PoolError::Cancelled`] once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Treat a result for any id outside `ids` as [`PoolError::UnknownJob`].
    pub fn with_known_jobs(mut self, ids: impl IntoIterator<Item = JobId>) -> Self {
        self.known = Some(ids.into_iter().collect());
        self
    }

    /// Collect until `expected` distinct results arrived or `deadline` elapsed.
    ///
    /// Never waits past `deadline`; a zero deadline returns whatever is ready
    /// without blocking. Duplicate or unknown job ids stop collection with an
    /// error and are not merged into the results.
    pub async fn collect(&self, expected: usize, deadline: Duration) -> Collection<V> {
        let mut collection = Collection::new(expected);
        if expected == 0 {
            return collection;
        }

        let incoming = stream::unfold(self.results.clone(), |queue| async move {
            queue.pop().await.map(|result| (result, queue))
        });
        let mut mux = Multiplexer::new();
        if let Some(token) = &self.cancel {
            mux.set_cancellation(token.clone());
        }
        mux.add_stream(incoming);
        mux.add_timeout(deadline);

        collection.status = loop {
            if let Some(done) = self.take_buffered(&mut collection) {
                break done;
            }
            let received = collection.len();
            match mux.next().await {
                Ready::Item(_, result) => {
                    if let Some(done) = self.admit(&mut collection, result) {
                        break done;
                    }
                }
                Ready::Elapsed(_) => {
                    // Results already sitting in the queue count even when the timer won.
                    if let Some(done) = self.take_buffered(&mut collection) {
                        break done;
                    }
                    let received = collection.len();
                    break Err(PoolError::Timeout { expected, received });
                }
                Ready::Cancelled => break Err(PoolError::Cancelled { expected, received }),
                Ready::Closed(_) | Ready::Idle => {
                    break Err(PoolError::Incomplete { expected, received });
                }
            }
        };

        match &collection.status {
            Ok(()) => tracing::debug!("Collected all {} results", expected),
            Err(e) => tracing::warn!("Collection stopped early: {}", e),
        }
        collection
    }

    /// Move every result already buffered in the queue into `collection` without
    /// waiting. Does nothing once cancellation has fired.
    fn take_buffered(&self, collection: &mut Collection<V>) -> Option<Result<(), PoolError>> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return None;
        }
        while let Some(result) = self.results.try_pop() {
            if let Some(done) = self.admit(collection, result) {
                return Some(done);
            }
        }
        None
    }

    /// Merge one result. `Some` means collection is over, either complete or broken.
    fn admit(
        &self,
        collection: &mut Collection<V>,
        result: JobResult<V>,
    ) -> Option<Result<(), PoolError>> {
        let job_id = result.job_id;
        if let Some(known) = &self.known
            && !known.contains(&job_id)
        {
            tracing::error!("Received result for {} which was never submitted", job_id);
            return Some(Err(PoolError::UnknownJob(job_id)));
        }
        if let Err(e) = collection.accept(result) {
            tracing::error!("Result stream broke the one-result-per-job rule: {}", e);
            return Some(Err(e));
        }
        (collection.len() == collection.expected).then_some(Ok(()))
    }
}
