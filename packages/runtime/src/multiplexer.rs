//! Wait-any primitive over streams, timers and a cancellation signal.
//!
//! A [`Multiplexer`] blocks until one of its sources is ready and hands back that
//! one source's event. Tie-break rules:
//!
//! - A cancelled token always wins, whatever else is ready.
//! - Among ready streams and timers, selection rotates: polling starts just after the
//!   previous winner, so a source that stays ready is never starved.
//!
//! Timers compare against the clock before polling their sleep, so an already
//! elapsed deadline (including a zero timeout) is ready without yielding.

use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{BoxStream, Stream};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Handle identifying a source registered with a [`Multiplexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

/// The event a [`Multiplexer::next`] call resolved with.
#[derive(Debug, PartialEq, Eq)]
pub enum Ready<T> {
    /// A stream produced an item.
    Item(SourceId, T),
    /// A stream ended. Reported once; the stream is skipped afterwards.
    Closed(SourceId),
    /// A timer's deadline passed.
    Elapsed(SourceId),
    /// The cancellation token fired.
    Cancelled,
    /// Nothing is left to wait on: every stream ended, no timer and no token.
    Idle,
}

enum Source<'a, T> {
    Stream {
        id: SourceId,
        stream: BoxStream<'a, T>,
        ended: bool,
    },
    Timer {
        id: SourceId,
        deadline: Instant,
        sleep: Pin<Box<Sleep>>,
    },
}

struct Cancellation {
    token: CancellationToken,
    wait: Pin<Box<WaitForCancellationFutureOwned>>,
}

/// Waits on a dynamic set of sources; see the module docs for selection rules.
pub struct Multiplexer<'a, T> {
    sources: Vec<Source<'a, T>>,
    cancel: Option<Cancellation>,
    /// Index polled first on the next call.
    cursor: usize,
    next_id: usize,
}

impl<T> Default for Multiplexer<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> Multiplexer<'a, T> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cancel: None,
            cursor: 0,
            next_id: 0,
        }
    }

    /// Use `token` as the cancellation source. Replaces any previous token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.set_cancellation(token);
        self
    }

    pub fn set_cancellation(&mut self, token: CancellationToken) {
        let wait = Box::pin(token.clone().cancelled_owned());
        self.cancel = Some(Cancellation { token, wait });
    }

    /// Register a stream whose items become [`Ready::Item`] events.
    pub fn add_stream<S>(&mut self, stream: S) -> SourceId
    where
        S: Stream<Item = T> + Send + 'a,
    {
        let id = self.allocate_id();
        self.sources.push(Source::Stream {
            id,
            stream: stream.boxed(),
            ended: false,
        });
        id
    }

    /// Register a timer that becomes ready `after` from now.
    pub fn add_timeout(&mut self, after: Duration) -> SourceId {
        self.add_deadline(Instant::now() + after)
    }

    /// Register a timer that becomes ready at `deadline`. Stays ready once elapsed.
    pub fn add_deadline(&mut self, deadline: Instant) -> SourceId {
        let id = self.allocate_id();
        self.sources.push(Source::Timer {
            id,
            deadline,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
        });
        id
    }

    /// Drop a source. Returns whether it was registered.
    pub fn remove(&mut self, id: SourceId) -> bool {
        let Some(index) = self.sources.iter().position(|s| s.id() == id) else {
            return false;
        };
        self.sources.remove(index);
        if self.cursor > index {
            self.cursor -= 1;
        }
        true
    }

    /// Number of registered sources, ended streams included.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Wait until a source is ready.
    pub async fn next(&mut self) -> Ready<T> {
        poll_fn(|cx| self.poll_ready(cx)).await
    }

    /// Poll every source once, in fairness order, and return the first ready event.
    pub fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Ready<T>> {
        if let Some(cancel) = self.cancel.as_mut() {
            if cancel.token.is_cancelled() || cancel.wait.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Ready::Cancelled);
            }
        }

        let len = self.sources.len();
        let mut live = 0;
        for offset in 0..len {
            let index = (self.cursor + offset) % len;
            let event = match &mut self.sources[index] {
                Source::Stream { ended: true, .. } => continue,
                Source::Stream { id, stream, ended } => {
                    live += 1;
                    match stream.poll_next_unpin(cx) {
                        Poll::Ready(Some(item)) => Ready::Item(*id, item),
                        Poll::Ready(None) => {
                            *ended = true;
                            Ready::Closed(*id)
                        }
                        Poll::Pending => continue,
                    }
                }
                Source::Timer {
                    id,
                    deadline,
                    sleep,
                } => {
                    live += 1;
                    if Instant::now() >= *deadline || sleep.as_mut().poll(cx).is_ready() {
                        Ready::Elapsed(*id)
                    } else {
                        continue;
                    }
                }
            };
            self.cursor = (index + 1) % len;
            return Poll::Ready(event);
        }

        if live == 0 && self.cancel.is_none() {
            return Poll::Ready(Ready::Idle);
        }
        Poll::Pending
    }

    fn allocate_id(&mut self) -> SourceId {
        let id = SourceId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<T> Source<'_, T> {
    fn id(&self) -> SourceId {
        match self {
            Source::Stream { id, .. } | Source::Timer { id, .. } => *id,
        }
    }
}
