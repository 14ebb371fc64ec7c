//! Bounded FIFO hand-off queue shared by producers and consumers.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use pool_core::ClosedQueueError;
use tokio::sync::Notify;

/// Fixed-capacity, multi-producer multi-consumer FIFO queue with one-way close.
///
/// `push` suspends while the queue is full and `pop` suspends while it is empty and
/// open. A capacity of zero is a synchronous hand-off: a push only lands when a
/// consumer is already waiting for it. Closing keeps buffered items; consumers drain
/// them and then observe end-of-stream.
///
/// Cloning produces another handle to the same queue.
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    /// Consumers wait here for items or close.
    not_empty: Notify,
    /// Producers wait here for space or close.
    not_full: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    /// Consumers currently suspended in `pop`; each reserves one slot when capacity is 0.
    waiting_consumers: usize,
}

impl<T> Inner<T> {
    fn has_room(&self, state: &State<T>) -> bool {
        let limit = if self.capacity == 0 {
            state.waiting_consumers
        } else {
            self.capacity
        };
        state.items.len() < limit
    }
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.inner.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> BoundedQueue<T> {
    /// Create an open queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                    waiting_consumers: 0,
                }),
                not_empty: Notify::new(),
                not_full: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of buffered items not yet taken by a consumer.
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Enqueue an item, waiting for space if the queue is full.
    ///
    /// Fails with the item handed back once the queue is closed, including when the
    /// close happens while this push is waiting.
    pub async fn push(&self, item: T) -> Result<(), ClosedQueueError<T>> {
        loop {
            let notified = self.inner.not_full.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a wake between the check and the
            // await is not lost.
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(ClosedQueueError(item));
                }
                if self.inner.has_room(&state) {
                    state.items.push_back(item);
                    drop(state);
                    self.inner.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Take the oldest item, waiting while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and fully drained. Dropping the
    /// returned future before it completes never loses an item.
    pub async fn pop(&self) -> Option<T> {
        let mut waiter = ConsumerWaiter::register(&self.inner);

        loop {
            let notified = self.inner.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if let Some(item) = state.items.pop_front() {
                    waiter.release(&mut state);
                    drop(state);
                    self.inner.not_full.notify_one();
                    return Some(item);
                }
                if state.closed {
                    waiter.release(&mut state);
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the oldest item if one is buffered, without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.inner.state.lock().items.pop_front()?;
        self.inner.not_full.notify_one();
        Some(item)
    }

    /// Close the queue. Idempotent; buffered items remain available to consumers.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.inner.not_empty.notify_waiters();
        self.inner.not_full.notify_waiters();
        true
    }
}

/// Tracks a consumer suspended in `pop` so zero-capacity pushes can hand off to it.
struct ConsumerWaiter<'a, T> {
    inner: &'a Inner<T>,
    registered: bool,
}

impl<'a, T> ConsumerWaiter<'a, T> {
    fn register(inner: &'a Inner<T>) -> Self {
        inner.state.lock().waiting_consumers += 1;
        if inner.capacity == 0 {
            inner.not_full.notify_one();
        }
        Self {
            inner,
            registered: true,
        }
    }

    fn release(&mut self, state: &mut State<T>) {
        if self.registered {
            state.waiting_consumers -= 1;
            self.registered = false;
        }
    }
}

impl<T> Drop for ConsumerWaiter<'_, T> {
    fn drop(&mut self) {
        if self.registered {
            let mut state = self.inner.state.lock();
            state.waiting_consumers -= 1;
        }
    }
}
