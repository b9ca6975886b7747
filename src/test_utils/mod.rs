//! Scripted task contexts for exercising the processor and wait lists.

use crate::runtime::TaskCounter;
use crate::runtime::counter::CounterToken;
use crate::runtime::processor::ProcessorHandle;
use crate::sync::WaitList;
use crate::task::{CancellationReason, TaskContext, TaskHandle, TaskId, WakeupSource};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Everything observable that happened to a set of stub tasks, in order.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    entries: Mutex<Vec<(TaskId, Event)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Step,
    Finished,
    Wakeup(WakeupSource),
    Cancel(CancellationReason),
}

impl EventLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, id: TaskId, event: Event) {
        self.entries.lock().push((id, event));
    }

    /// Events recorded for one task, in order.
    pub(crate) fn of(&self, id: TaskId) -> Vec<Event> {
        self.entries
            .lock()
            .iter()
            .filter(|(task, _)| *task == id)
            .map(|(_, event)| *event)
            .collect()
    }

    /// Which tasks recorded `event`, in recording order.
    pub(crate) fn order_of(&self, event: Event) -> Vec<TaskId> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| *e == event)
            .map(|(task, _)| *task)
            .collect()
    }
}

/// Start building a [`StubTask`].
pub(crate) fn stub() -> StubTaskBuilder {
    StubTaskBuilder {
        critical: false,
        finish_after: 1,
        park_on: None,
        busy_for: None,
        panic_on_step: false,
        wake_on_cancel: false,
        log: None,
        token: None,
    }
}

pub(crate) struct StubTaskBuilder {
    critical: bool,
    finish_after: usize,
    park_on: Option<Arc<WaitList>>,
    busy_for: Option<Duration>,
    panic_on_step: bool,
    wake_on_cancel: bool,
    log: Option<Arc<EventLog>>,
    token: Option<CounterToken>,
}

impl StubTaskBuilder {
    /// Exempt from overload cancellation.
    pub(crate) fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Finish after `steps` steps, rescheduling itself in between.
    pub(crate) fn finish_after(mut self, steps: usize) -> Self {
        self.finish_after = steps;
        self
    }

    /// Park on `list` during the first step; finish on the step after the
    /// wakeup.
    pub(crate) fn park_on(mut self, list: &Arc<WaitList>) -> Self {
        self.park_on = Some(Arc::clone(list));
        self
    }

    /// Sleep in every step, to keep a worker busy.
    pub(crate) fn busy_for(mut self, pause: Duration) -> Self {
        self.busy_for = Some(pause);
        self
    }

    /// Panic when stepped.
    pub(crate) fn panics(mut self) -> Self {
        self.panic_on_step = true;
        self
    }

    /// React to `request_cancel` by waking up, the way a real context
    /// interrupts a suspension to run its cancellation checkpoint.
    pub(crate) fn wake_on_cancel(mut self) -> Self {
        self.wake_on_cancel = true;
        self
    }

    pub(crate) fn log_to(mut self, log: &Arc<EventLog>) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    /// Hold a live-task token until the task finishes.
    pub(crate) fn counted_by(mut self, counter: &Arc<TaskCounter>) -> Self {
        self.token = Some(counter.token());
        self
    }

    pub(crate) fn build(self) -> Arc<StubTask> {
        Arc::new_cyclic(|this| StubTask {
            id: TaskId::next(),
            critical: self.critical,
            finish_after: self.finish_after,
            park_on: self.park_on,
            busy_for: self.busy_for,
            panic_on_step: self.panic_on_step,
            wake_on_cancel: self.wake_on_cancel,
            log: self.log,
            detached: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            steps: AtomicUsize::new(0),
            queue_wait_timepoint: Mutex::new(None),
            cancellations: Mutex::new(Vec::new()),
            wakeups: Mutex::new(Vec::new()),
            scheduler: Mutex::new(None),
            token: Mutex::new(self.token),
            observed_thread: Mutex::new(None),
            this: this.clone(),
        })
    }
}

/// A scripted [`TaskContext`].
#[derive(Debug)]
pub(crate) struct StubTask {
    id: TaskId,
    critical: bool,
    finish_after: usize,
    park_on: Option<Arc<WaitList>>,
    busy_for: Option<Duration>,
    panic_on_step: bool,
    wake_on_cancel: bool,
    log: Option<Arc<EventLog>>,
    detached: AtomicBool,
    finished: AtomicBool,
    steps: AtomicUsize,
    queue_wait_timepoint: Mutex<Option<Instant>>,
    cancellations: Mutex<Vec<CancellationReason>>,
    wakeups: Mutex<Vec<WakeupSource>>,
    scheduler: Mutex<Option<ProcessorHandle>>,
    token: Mutex<Option<CounterToken>>,
    observed_thread: Mutex<Option<String>>,
    this: Weak<StubTask>,
}

impl StubTask {
    pub(crate) fn as_handle(&self) -> TaskHandle {
        let this: Arc<StubTask> = self.this.upgrade().expect("stub task already dropped");
        this
    }

    /// Let `wakeup` reschedule this task onto `handle`'s processor.
    pub(crate) fn bind(&self, handle: &ProcessorHandle) {
        *self.scheduler.lock() = Some(handle.clone());
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub(crate) fn cancellations(&self) -> Vec<CancellationReason> {
        self.cancellations.lock().clone()
    }

    pub(crate) fn wakeups(&self) -> Vec<WakeupSource> {
        self.wakeups.lock().clone()
    }

    /// Name of the worker thread that last stepped this task.
    pub(crate) fn observed_thread(&self) -> Option<String> {
        self.observed_thread.lock().clone()
    }

    /// Poll until the task finishes or `timeout` elapses.
    pub(crate) fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    fn record(&self, event: Event) {
        if let Some(log) = &self.log {
            log.record(self.id, event);
        }
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.record(Event::Finished);
        // The task is no longer live.
        self.token.lock().take();
    }

    fn reschedule(&self) {
        let scheduler = self.scheduler.lock().clone();
        if let Some(handle) = scheduler {
            handle.schedule(self.as_handle());
        }
    }
}

impl TaskContext for StubTask {
    fn task_id(&self) -> TaskId {
        self.id
    }

    fn do_step(&self) {
        let step = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(Event::Step);

        #[cfg(target_os = "linux")]
        {
            *self.observed_thread.lock() = crate::utils::thread::current_thread_name().ok();
        }

        if let Some(pause) = self.busy_for {
            thread::sleep(pause);
        }

        if self.panic_on_step {
            panic!("scripted step failure");
        }

        // Cancellation checkpoint: unwind instead of continuing, after
        // clearing any slot still held on the wait list.
        if !self.cancellations.lock().is_empty() {
            if let Some(list) = &self.park_on {
                list.remove(&self.as_handle());
            }
            self.finish();
            return;
        }

        if step == 1 {
            if let Some(list) = &self.park_on {
                let mut lock = list.lock();
                list.append(&mut lock, self.as_handle());
                return;
            }
        }

        if step >= self.finish_after {
            self.finish();
        } else {
            self.reschedule();
        }
    }

    fn request_cancel(&self, reason: CancellationReason) {
        let first = {
            let mut cancellations = self.cancellations.lock();
            cancellations.push(reason);
            cancellations.len() == 1
        };
        self.record(Event::Cancel(reason));

        // Only the first request interrupts the suspension; a context
        // already racing towards its cancellation checkpoint must not be
        // rescheduled again.
        if first && self.wake_on_cancel {
            self.wakeup(WakeupSource::Cancel);
        }
    }

    fn wakeup(&self, source: WakeupSource) {
        self.wakeups.lock().push(source);
        self.record(Event::Wakeup(source));
        self.reschedule();
    }

    fn set_queue_wait_timepoint(&self, timepoint: Option<Instant>) {
        *self.queue_wait_timepoint.lock() = timepoint;
    }

    fn queue_wait_timepoint(&self) -> Option<Instant> {
        *self.queue_wait_timepoint.lock()
    }

    fn is_critical(&self) -> bool {
        self.critical
    }

    fn set_detached(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}
