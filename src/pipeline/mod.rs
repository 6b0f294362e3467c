//! `BoundedPipeline`: a byte-budgeted producer/consumer queue with background stages.
//!
//! A pipeline owns up to two background threads: a producer that fills the queue from a
//! closure and a consumer that drains it into a closure. Either side may instead be driven
//! from the caller's thread with [`push`](BoundedPipeline::push) /
//! [`pop`](BoundedPipeline::pop).
//!
//! Capacity is a byte budget rather than an item count: every item is pushed with its size and
//! the producer blocks while the queued bytes would exceed the budget. An item larger than the
//! whole budget is still admitted once the queue is empty, so oversized blocks slow the pipeline
//! down instead of wedging it.
//!
//! A stage that fails aborts the pipeline. Every blocked `push`/`pop` then wakes up with
//! [`PartitionError::Aborted`], the other stage exits quietly, and [`join`](BoundedPipeline::join)
//! reports the error that caused the abort.

use crate::error::PartitionError;
use crossbeam_utils::CachePadded;
use std::collections::VecDeque;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

struct Queue<T> {
    items: VecDeque<(T, usize)>,
    bytes: usize,
    finished: bool,
}

struct Shared<T> {
    name: &'static str,
    capacity: usize,
    queue: Mutex<Queue<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    aborted: CachePadded<AtomicBool>,
    pushed_items: CachePadded<AtomicUsize>,
    pushed_bytes: CachePadded<AtomicUsize>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Queue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn abort(&self) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            debug!(pipeline = self.name, "aborting");
        }
        // Taking the lock orders the flag before any waiter's next predicate check.
        drop(self.lock());
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn push(&self, item: T, size: usize) -> Result<(), PartitionError> {
        let mut queue = self.lock();
        while !queue.items.is_empty()
            && queue.bytes.saturating_add(size) > self.capacity
            && !self.is_aborted()
        {
            queue = self.not_full.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
        if self.is_aborted() {
            return Err(PartitionError::Aborted);
        }
        queue.items.push_back((item, size));
        queue.bytes += size;
        drop(queue);

        self.pushed_items.fetch_add(1, Ordering::Relaxed);
        self.pushed_bytes.fetch_add(size, Ordering::Relaxed);
        self.not_empty.notify_one();
        Ok(())
    }

    fn pop(&self) -> Result<Option<T>, PartitionError> {
        let mut queue = self.lock();
        while queue.items.is_empty() && !queue.finished && !self.is_aborted() {
            queue = self.not_empty.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
        if self.is_aborted() {
            return Err(PartitionError::Aborted);
        }
        let Some((item, size)) = queue.items.pop_front() else {
            return Ok(None);
        };
        queue.bytes -= size;
        drop(queue);

        self.not_full.notify_one();
        Ok(Some(item))
    }

    fn set_finished(&self) {
        self.lock().finished = true;
        self.not_empty.notify_all();
    }
}

/// Bounded queue between a producer stage and a consumer stage.
///
/// Stage closures return `Result<_, E>`; `E` only needs to absorb [`PartitionError`], so the
/// core uses `PartitionError` itself and callers at the edges can use `anyhow::Error`.
pub struct BoundedPipeline<T, E = PartitionError> {
    shared: Arc<Shared<T>>,
    producer: Option<JoinHandle<Result<(), E>>>,
    consumer: Option<JoinHandle<Result<(), E>>>,
}

impl<T, E> BoundedPipeline<T, E>
where
    T: Send + 'static,
    E: From<PartitionError> + Send + 'static,
{
    /// Creates an idle pipeline holding at most `capacity_bytes` of queued items.
    pub fn new(name: &'static str, capacity_bytes: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                name,
                capacity: capacity_bytes.max(1),
                queue: Mutex::new(Queue {
                    items: VecDeque::new(),
                    bytes: 0,
                    finished: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                aborted: CachePadded::new(AtomicBool::new(false)),
                pushed_items: CachePadded::new(AtomicUsize::new(0)),
                pushed_bytes: CachePadded::new(AtomicUsize::new(0)),
            }),
            producer: None,
            consumer: None,
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Byte budget.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Starts a background producer.
    ///
    /// `produce` is called repeatedly; `Ok(Some((item, bytes)))` queues an item, `Ok(None)` ends
    /// the stream and marks the pipeline finished, and an error aborts the pipeline.
    ///
    /// # Panics
    /// Panics if a producer was already started.
    pub fn start_producer<F>(&mut self, mut produce: F)
    where
        F: FnMut() -> Result<Option<(T, usize)>, E> + Send + 'static,
    {
        assert!(self.producer.is_none(), "producer already started");
        let shared = Arc::clone(&self.shared);
        self.producer = Some(thread::spawn(move || loop {
            if shared.is_aborted() {
                return Ok(());
            }
            match produce() {
                Ok(Some((item, size))) => {
                    trace!(pipeline = shared.name, bytes = size, "produced");
                    if shared.push(item, size).is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    shared.set_finished();
                    return Ok(());
                }
                Err(err) => {
                    shared.abort();
                    return Err(err);
                }
            }
        }));
    }

    /// Starts a background consumer that feeds every item to `consume` until the pipeline is
    /// finished and drained. An error from `consume` aborts the pipeline.
    ///
    /// # Panics
    /// Panics if a consumer was already started.
    pub fn start_consumer<F>(&mut self, mut consume: F)
    where
        F: FnMut(T) -> Result<(), E> + Send + 'static,
    {
        assert!(self.consumer.is_none(), "consumer already started");
        let shared = Arc::clone(&self.shared);
        self.consumer = Some(thread::spawn(move || loop {
            match shared.pop() {
                Ok(Some(item)) => {
                    if let Err(err) = consume(item) {
                        shared.abort();
                        return Err(err);
                    }
                }
                Ok(None) | Err(_) => return Ok(()),
            }
        }));
    }

    /// Queues `item` accounted as `size` bytes, blocking while the budget is exhausted.
    pub fn push(&self, item: T, size: usize) -> Result<(), PartitionError> {
        self.shared.push(item, size)
    }

    /// Takes the next item, blocking while the queue is empty. `Ok(None)` once the pipeline is
    /// finished and drained.
    pub fn pop(&self) -> Result<Option<T>, PartitionError> {
        self.shared.pop()
    }

    /// Declares that no more items will be pushed.
    pub fn set_finished(&self) {
        self.shared.set_finished();
    }

    /// Tears the pipeline down; blocked stages return [`PartitionError::Aborted`].
    pub fn abort(&self) {
        self.shared.abort();
    }

    /// Returns `true` once the pipeline was aborted.
    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Items and bytes pushed so far.
    pub fn throughput(&self) -> (usize, usize) {
        (
            self.shared.pushed_items.load(Ordering::Relaxed),
            self.shared.pushed_bytes.load(Ordering::Relaxed),
        )
    }

    /// Waits for the background consumer to drain the queue.
    ///
    /// Call [`set_finished`](Self::set_finished) first, or this blocks forever.
    pub fn wait_consumer(&mut self) -> Result<(), E> {
        let result = Self::join_stage(self.consumer.take());
        if result.is_ok() && self.is_aborted() {
            return Self::join_stage(self.producer.take()).and(Err(PartitionError::Aborted.into()));
        }
        result
    }

    /// Joins both background stages and returns the error that aborted the pipeline, if any.
    pub fn join(&mut self) -> Result<(), E> {
        let producer = Self::join_stage(self.producer.take());
        let consumer = Self::join_stage(self.consumer.take());
        producer.and(consumer)
    }

    fn join_stage(stage: Option<JoinHandle<Result<(), E>>>) -> Result<(), E> {
        match stage.map(JoinHandle::join) {
            None => Ok(()),
            Some(Ok(result)) => result,
            Some(Err(payload)) => panic::resume_unwind(payload),
        }
    }
}

impl<T, E> Drop for BoundedPipeline<T, E> {
    fn drop(&mut self) {
        if self.producer.is_none() && self.consumer.is_none() {
            return;
        }
        // Unjoined stages are abandoned: stop them and reap the threads.
        self.shared.abort();
        for stage in [self.producer.take(), self.consumer.take()].into_iter().flatten() {
            let _ = stage.join();
        }
    }
}
