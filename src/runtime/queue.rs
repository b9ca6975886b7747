use crate::task::TaskHandle;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How long a worker blocks on the queue before re-checking whether the
/// processor is still running.
pub(crate) const DEQUEUE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// MPMC run queue feeding the worker pool.
///
/// FIFO per producer, lock-free-style dequeue. The `size` gauge counts
/// handles logically in the queue: it is bumped before the send and
/// decremented by the worker after a successful dequeue, so a burst of
/// producers can briefly observe a value above the configured threshold.
/// That slack is accepted; the gauge is advisory.
#[derive(Debug)]
pub(crate) struct TaskQueue {
    tx: Sender<TaskHandle>,
    rx: Receiver<TaskHandle>,
    size: AtomicUsize,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            size: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Transfer one handle into the queue. The task may start executing
    /// on a worker before this returns.
    pub(crate) fn push(&self, context: TaskHandle) {
        self.size.fetch_add(1, Ordering::Relaxed);
        // The send side only fails once every receiver is gone, i.e. the
        // worker pool has already been torn down.
        let _ = self.tx.send(context);
    }

    /// Dequeue with a bounded wait.
    pub(crate) fn pop_timed(&self, timeout: Duration) -> Result<TaskHandle, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Settle the size gauge after a successful `pop_timed`.
    pub(crate) fn mark_dequeued(&self) {
        self.size.fetch_sub(1, Ordering::Relaxed);
    }
}
