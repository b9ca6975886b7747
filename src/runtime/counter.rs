use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const EXHAUSTION_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Per-processor task accounting.
///
/// The live gauge is RAII-driven: a [`CounterToken`] marks one live task
/// from creation to the drop of its final reference. The remaining fields
/// are advisory event counters with relaxed ordering.
#[derive(Debug, Default)]
pub struct TaskCounter {
    tasks_alive: AtomicUsize,
    tasks_started: AtomicU64,
    task_overload: AtomicU64,
    task_cancel_overload: AtomicU64,
    task_switch_slow: AtomicU64,
}

impl TaskCounter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark one task as live until the returned token is dropped.
    pub fn token(self: &Arc<Self>) -> CounterToken {
        self.tasks_alive.fetch_add(1, Ordering::Relaxed);
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
        CounterToken {
            counter: Arc::clone(self),
        }
    }

    /// Current number of live tasks bound to this counter.
    pub fn value(&self) -> usize {
        self.tasks_alive.load(Ordering::Relaxed)
    }

    /// Block until the live-task count reaches zero or `timeout` elapses.
    /// Returns whether exhaustion was observed.
    pub fn wait_for_exhaustion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.value() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXHAUSTION_POLL_INTERVAL);
        }
    }

    pub fn tasks_started(&self) -> u64 {
        self.tasks_started.load(Ordering::Relaxed)
    }

    pub fn task_overload(&self) -> u64 {
        self.task_overload.load(Ordering::Relaxed)
    }

    pub fn task_cancel_overload(&self) -> u64 {
        self.task_cancel_overload.load(Ordering::Relaxed)
    }

    pub fn task_switch_slow(&self) -> u64 {
        self.task_switch_slow.load(Ordering::Relaxed)
    }

    pub(crate) fn account_task_overload(&self) {
        self.task_overload.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn account_task_cancel_overload(&self) {
        self.task_cancel_overload.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn account_task_switch_slow(&self) {
        self.task_switch_slow.fetch_add(1, Ordering::Relaxed);
    }
}

/// RAII live-task marker.
///
/// Held by the task-context implementation for as long as the task is
/// alive; a task can be enqueued and re-enqueued many times under a
/// single token.
#[derive(Debug)]
pub struct CounterToken {
    counter: Arc<TaskCounter>,
}

impl Drop for CounterToken {
    fn drop(&mut self) {
        self.counter.tasks_alive.fetch_sub(1, Ordering::Relaxed);
    }
}
