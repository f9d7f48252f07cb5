//! Bounded buffer of deferred send tasks.
//!
//! The buffer holds *not-yet-started* units of asynchronous work. Enqueuing
//! ([`TaskBuffer::add`]) is a pure admission decision; execution happens only
//! when the owner drains, at which point every pending producer is invoked in
//! insertion order and the resulting futures run concurrently. That
//! deferred-start property is what lets a short-lived host accumulate sends
//! cheaply and pay for the network exactly once, right before teardown.

use std::fmt;
use std::mem;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

/// Default number of pending tasks a buffer admits.
pub const DEFAULT_BUFFER_SIZE: usize = 30;

/// A deferred, not-yet-invoked unit of asynchronous work.
pub type TaskProducer<T> = Box<dyn FnOnce() -> BoxFuture<'static, T> + Send>;

/// Admission failure: the buffer already holds `capacity` pending tasks.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("task buffer is full (capacity {capacity})")]
pub struct BufferFullError {
    /// The fixed capacity the buffer was constructed with.
    pub capacity: usize,
}

/// Capacity-bounded FIFO of deferred task producers.
///
/// `add` and `drain` are the only mutators. Both take the lock for a
/// synchronous critical section (test-and-append, detach-and-swap) and
/// never hold it across an await, so the buffer can be shared freely on a
/// multi-threaded runtime. A drain detaches the whole pending list at once;
/// a new wave of tasks can accumulate while the old wave is still settling,
/// and several drain episodes may be in flight concurrently.
pub struct TaskBuffer<T> {
    capacity: usize,
    pending: Mutex<Vec<TaskProducer<T>>>,
}

impl<T> TaskBuffer<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pending (admitted but not yet started) tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Admit a deferred task.
    ///
    /// A single test-and-append under the lock: fails with
    /// [`BufferFullError`] when the pending count is already at capacity,
    /// without mutating state. Success means the producer is queued - it
    /// has not been invoked and will not be until a drain.
    pub fn add(&self, producer: TaskProducer<T>) -> Result<(), BufferFullError> {
        let mut pending = self.lock_pending();
        if pending.len() >= self.capacity {
            return Err(BufferFullError {
                capacity: self.capacity,
            });
        }
        pending.push(producer);
        Ok(())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<TaskProducer<T>>> {
        self.pending
            .lock()
            .expect("pending task list lock poisoned")
    }
}

impl<T: Send + 'static> TaskBuffer<T> {
    /// Start every pending task and wait for the wave to settle.
    ///
    /// The pending list is detached in one swap, so `add` calls made while
    /// this drain is in flight land in a fresh list. Producers are invoked
    /// in insertion order and spawned onto the runtime; task failures are
    /// discarded so one bad send cannot hold up the rest.
    ///
    /// Returns `true` once every started task has settled. With a positive
    /// `timeout` that elapses first, returns `false` instead - the leftover
    /// tasks keep running in the background, unobserved. A `timeout` of
    /// `None` or zero disables the deadline entirely.
    pub async fn drain(&self, timeout: Option<Duration>) -> bool {
        let detached = mem::take(&mut *self.lock_pending());
        if detached.is_empty() {
            return true;
        }
        tracing::debug!(tasks = detached.len(), "draining send buffer");

        let handles: Vec<_> = detached
            .into_iter()
            .map(|producer| {
                let task = producer();
                tokio::spawn(async move {
                    let _ = task.await;
                })
            })
            .collect();

        let all_settled = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        match timeout {
            Some(limit) if !limit.is_zero() => {
                // Dropping the JoinHandles above detaches without aborting;
                // a timed-out wave keeps settling in the background.
                tokio::time::timeout(limit, all_settled).await.is_ok()
            }
            _ => {
                all_settled.await;
                true
            }
        }
    }
}

impl<T> Default for TaskBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl<T> fmt::Debug for TaskBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuffer")
            .field("capacity", &self.capacity)
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::time::sleep;

    use super::*;

    fn deferred<T, F>(fut: F) -> TaskProducer<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        Box::new(move || -> BoxFuture<'static, T> { Box::pin(fut) })
    }

    #[tokio::test]
    async fn add_rejects_when_at_capacity() {
        let buffer: TaskBuffer<()> = TaskBuffer::new(2);
        buffer.add(deferred(async {})).unwrap();
        buffer.add(deferred(async {})).unwrap();

        let err = buffer.add(deferred(async {})).unwrap_err();
        assert_eq!(err.capacity, 2);
        assert_eq!(buffer.len(), 2);
    }

    #[tokio::test]
    async fn drain_on_empty_buffer_resolves_immediately() {
        let buffer: TaskBuffer<()> = TaskBuffer::default();
        assert_eq!(buffer.capacity(), DEFAULT_BUFFER_SIZE);
        assert!(buffer.drain(Some(Duration::from_millis(1))).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_every_admitted_task() {
        let buffer: TaskBuffer<&'static str> = TaskBuffer::new(2);
        let completed = Arc::new(AtomicUsize::new(0));

        for delay_ms in [10_u64, 20] {
            let completed = Arc::clone(&completed);
            buffer
                .add(deferred(async move {
                    sleep(Duration::from_millis(delay_ms)).await;
                    completed.fetch_add(1, Ordering::SeqCst);
                    "sent"
                }))
                .unwrap();
        }
        // Third admission over capacity 2 is rejected up front.
        assert!(buffer.add(deferred(async { "sent" })).is_err());

        assert!(buffer.drain(None).await);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn drain_swallows_task_failures() {
        let buffer: TaskBuffer<Result<(), &'static str>> = TaskBuffer::new(4);
        buffer.add(deferred(async { Err("connection reset") })).unwrap();
        buffer.add(deferred(async { Ok(()) })).unwrap();
        buffer.add(deferred(async { Err("dns failure") })).unwrap();

        assert!(buffer.drain(None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_but_tasks_keep_running() {
        let buffer: TaskBuffer<()> = TaskBuffer::new(1);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        buffer
            .add(deferred(async move {
                sleep(Duration::from_millis(500)).await;
                flag.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(!buffer.drain(Some(Duration::from_millis(50))).await);
        assert!(!finished.load(Ordering::SeqCst));

        // The detached task was not cancelled by the timeout.
        sleep(Duration::from_millis(600)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_disables_the_deadline() {
        let buffer: TaskBuffer<()> = TaskBuffer::new(1);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        buffer
            .add(deferred(async move {
                sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(buffer.drain(Some(Duration::ZERO)).await);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn accepts_a_new_wave_while_the_old_one_drains() {
        let buffer: Arc<TaskBuffer<()>> = Arc::new(TaskBuffer::new(2));
        for _ in 0..2 {
            buffer
                .add(deferred(async {
                    sleep(Duration::from_millis(300)).await;
                }))
                .unwrap();
        }

        let draining = tokio::spawn({
            let buffer = Arc::clone(&buffer);
            async move { buffer.drain(None).await }
        });
        // Let the drain detach the first wave before refilling.
        tokio::task::yield_now().await;
        assert!(buffer.is_empty());
        assert!(!draining.is_finished());

        for _ in 0..2 {
            buffer
                .add(deferred(async {
                    sleep(Duration::from_millis(100)).await;
                }))
                .unwrap();
        }
        assert!(buffer.drain(None).await);
        assert!(draining.await.unwrap());
    }

    #[tokio::test]
    async fn producers_start_in_insertion_order() {
        let buffer: TaskBuffer<()> = TaskBuffer::new(8);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            buffer
                .add(Box::new(move || -> BoxFuture<'static, ()> {
                    order.lock().unwrap().push(i);
                    Box::pin(async {})
                }))
                .unwrap();
        }

        assert!(buffer.drain(None).await);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
