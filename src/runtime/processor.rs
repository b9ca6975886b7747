use crate::runtime::builder::ProcessorConfig;
use crate::runtime::counter::TaskCounter;
use crate::runtime::queue::TaskQueue;
use crate::runtime::settings::{OverloadAction, Settings};
use crate::runtime::worker;
use crate::task::{CancellationReason, TaskContext, TaskHandle, handle_key};
use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};

/// Every Nth schedule per producer thread stamps a real queue-wait
/// timepoint; the rest stamp "unset" and inherit the previous verdict on
/// dequeue. Reading the monotonic clock on every enqueue costs more than
/// the up-to-N-1 tasks that may be shed unmeasured.
pub(crate) const QUEUE_WAIT_SAMPLE_PERIOD: usize = 16;

/// Best-effort drain budget during shutdown. Tasks may be bound but not
/// scheduled yet when teardown begins.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// A worker-thread pool executing cooperative task steps.
///
/// Tasks enter through [`schedule`](ProcessorHandle::schedule); any idle
/// worker dequeues one and runs a single step, which completes the task,
/// suspends it (typically by parking on a
/// [`WaitList`](crate::sync::WaitList)), or fails. Overload policies shed
/// load by queue length and by sampled queue-wait time; detached tasks
/// are kept alive in a registry until a worker observes them finished.
///
/// Dropping the processor runs graceful shutdown: new schedules are
/// cancelled with [`CancellationReason::Shutdown`], detached tasks are
/// cancelled, live tasks get a brief drain window, then the workers are
/// stopped and joined.
#[derive(Debug)]
pub struct TaskProcessor {
    handle: ProcessorHandle,
    workers: Vec<thread::JoinHandle<()>>,
}

/// Cheaply clonable handle to a processor.
///
/// Handles are what task contexts keep for rescheduling themselves and
/// what worker threads run against. They do not keep the workers alive:
/// stopping is owned by the [`TaskProcessor`] value.
#[derive(Debug, Clone)]
pub struct ProcessorHandle {
    pub(crate) shared: Arc<Shared>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: ProcessorConfig,
    pub(crate) settings: Settings,
    pub(crate) queue: TaskQueue,
    pub(crate) counter: Arc<TaskCounter>,
    pub(crate) detached: Mutex<HashMap<usize, TaskHandle>>,
    pub(crate) is_running: AtomicBool,
    pub(crate) is_shutting_down: AtomicBool,
}

/// Point-in-time counters published by one processor.
#[derive(Debug, Clone)]
pub struct ProcessorStats {
    pub queue_size: usize,
    pub tasks_alive: usize,
    pub tasks_started: u64,
    pub task_overload: u64,
    pub task_cancel_overload: u64,
    pub task_switch_slow: u64,
    pub queue_wait_time_overloaded: bool,
}

impl TaskProcessor {
    pub(crate) fn start(config: ProcessorConfig) -> Result<Self> {
        trace!(
            thread_name = %config.thread_name,
            worker_threads = config.worker_threads,
            "starting task processor"
        );

        let settings = Settings::new(
            config.overload_action,
            config.max_queue_length,
            config.max_queue_wait_time,
        );

        let handle = ProcessorHandle {
            shared: Arc::new(Shared {
                settings,
                queue: TaskQueue::new(),
                counter: TaskCounter::new(),
                detached: Mutex::new(HashMap::new()),
                is_running: AtomicBool::new(true),
                is_shutting_down: AtomicBool::new(false),
                config,
            }),
        };

        let mut workers = Vec::with_capacity(handle.shared.config.worker_threads);
        for index in 0..handle.shared.config.worker_threads {
            match spawn_worker(&handle, index) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Unwind the partially started pool before bailing.
                    handle.shared.is_running.store(false, Ordering::Relaxed);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self { handle, workers })
    }

    /// A new handle to this processor.
    pub fn handle(&self) -> ProcessorHandle {
        self.handle.clone()
    }

    pub fn schedule(&self, context: TaskHandle) {
        self.handle.schedule(context)
    }

    pub fn adopt(&self, context: TaskHandle) {
        self.handle.adopt(context)
    }

    pub fn set_settings(
        &self,
        action: OverloadAction,
        max_queue_length: usize,
        max_queue_wait_time: Duration,
    ) {
        self.handle
            .set_settings(action, max_queue_length, max_queue_wait_time)
    }

    pub fn profiler_threshold(&self) -> Duration {
        self.handle.profiler_threshold()
    }

    pub fn counter(&self) -> &Arc<TaskCounter> {
        self.handle.counter()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.handle.stats()
    }

    fn shutdown(&mut self) {
        let shared = &self.handle.shared;

        // From here on every inbound schedule cancels its task.
        shared.is_shutting_down.store(true, Ordering::Relaxed);

        {
            let detached = shared.detached.lock();
            for context in detached.values() {
                context.request_cancel(CancellationReason::Shutdown);
            }
        }

        // Some tasks may be bound but not scheduled yet.
        shared.counter.wait_for_exhaustion(SHUTDOWN_DRAIN_TIMEOUT);

        shared.is_running.store(false, Ordering::Relaxed);

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked outside a task step");
            }
        }

        debug_assert_eq!(
            shared.counter.value(),
            0,
            "live tasks remain after processor shutdown"
        );
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ProcessorHandle {
    /// Enqueue `context` for execution.
    ///
    /// Infallible; overload and shutdown policies are applied to the task
    /// itself (cancellation hints), never surfaced to the caller. After
    /// this returns the task may already be executing, or even finished,
    /// on another thread.
    pub fn schedule(&self, context: TaskHandle) {
        let shared = &self.shared;

        let max_length = shared.settings.max_queue_length();
        if max_length > 0 && !context.is_critical() && shared.queue.len() >= max_length {
            warn!(
                task_id = %context.task_id(),
                queue_size = shared.queue.len(),
                threshold = max_length,
                "run queue is above its length threshold"
            );
            shared.handle_overload(&*context);
        }

        if shared.is_shutting_down.load(Ordering::Relaxed) {
            context.request_cancel(CancellationReason::Shutdown);
        }

        stamp_queue_wait_timepoint(&*context);

        shared.queue.push(context);
        // The task may already be running at this point.
    }

    /// Transfer a detached task into the processor's keep-alive registry.
    ///
    /// The registry drops the task after the worker that finishes it
    /// observes the detached flag; if the task is already finished the
    /// final reference is released here.
    pub fn adopt(&self, context: TaskHandle) {
        let mut detached = self.shared.detached.lock();

        // set_detached must happen under the registry mutex so that
        // is_finished cannot flip between this check and a worker's
        // is_detached check; see the worker's cleanup path.
        context.set_detached();

        // Fast path, skips the registry insert.
        if context.is_finished() {
            drop(detached);
            return;
        }

        let prev = detached.insert(handle_key(&context), context);
        debug_assert!(prev.is_none(), "task context adopted twice");
    }

    /// Atomically replace the three runtime tunables.
    pub fn set_settings(
        &self,
        action: OverloadAction,
        max_queue_length: usize,
        max_queue_wait_time: Duration,
    ) {
        self.shared
            .settings
            .update(action, max_queue_length, max_queue_wait_time);
    }

    /// Threshold above which callers (and the worker loop) log a task
    /// step as slow. Zero means step timing is disabled.
    pub fn profiler_threshold(&self) -> Duration {
        self.shared.config.profiler_threshold
    }

    pub fn counter(&self) -> &Arc<TaskCounter> {
        &self.shared.counter
    }

    pub fn stats(&self) -> ProcessorStats {
        let shared = &self.shared;
        ProcessorStats {
            queue_size: shared.queue.len(),
            tasks_alive: shared.counter.value(),
            tasks_started: shared.counter.tasks_started(),
            task_overload: shared.counter.task_overload(),
            task_cancel_overload: shared.counter.task_cancel_overload(),
            task_switch_slow: shared.counter.task_switch_slow(),
            queue_wait_time_overloaded: shared.settings.queue_wait_time_overloaded(),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached_len(&self) -> usize {
        self.shared.detached.lock().len()
    }
}

impl Shared {
    /// Wait-time overload check, run by workers on every dequeue.
    ///
    /// Sampled tasks update the processor-wide verdict; unsampled tasks
    /// inherit it. A disabled policy clears the verdict unconditionally.
    pub(crate) fn check_wait_time(&self, context: &dyn TaskContext) {
        let max_wait_time = self.settings.max_queue_wait_time();
        if max_wait_time.is_zero() {
            self.settings.set_queue_wait_time_overloaded(false);
            return;
        }

        if let Some(timepoint) = context.queue_wait_timepoint() {
            let wait_time = timepoint.elapsed();
            trace!(
                task_id = %context.task_id(),
                wait_us = wait_time.as_micros() as u64,
                "queue wait time"
            );
            self.settings
                .set_queue_wait_time_overloaded(wait_time >= max_wait_time);
        }
        // No timestamp: pretend this task waited as long as the previous
        // one and leave the verdict untouched.

        // Critical tasks are never cancelled here, but their timestamps
        // still drive the verdict that sheds other tasks.
        if self.settings.queue_wait_time_overloaded() {
            self.handle_overload(context);
        }
    }

    pub(crate) fn handle_overload(&self, context: &dyn TaskContext) {
        self.counter.account_task_overload();

        if self.settings.overload_action() == OverloadAction::Cancel {
            if !context.is_critical() {
                warn!(
                    task_id = %context.task_id(),
                    "task waited in queue for too long, cancelling"
                );
                context.request_cancel(CancellationReason::Overload);
                self.counter.account_task_cancel_overload();
            } else {
                trace!(
                    task_id = %context.task_id(),
                    "task waited in queue for too long, critical, not cancelling"
                );
            }
        }
    }
}

fn spawn_worker(handle: &ProcessorHandle, index: usize) -> Result<thread::JoinHandle<()>> {
    let config = &handle.shared.config;

    let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name, index));
    if let Some(stack_size) = config.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    let handle = handle.clone();
    builder
        .spawn(move || worker::run(handle))
        .with_context(|| format!("failed to spawn worker thread {index}"))
}

fn stamp_queue_wait_timepoint(context: &dyn TaskContext) {
    thread_local! {
        static SCHEDULED_TASKS: Cell<usize> = const { Cell::new(0) };
    }

    let count = SCHEDULED_TASKS.with(|counter| {
        let count = counter.get();
        counter.set(count.wrapping_add(1));
        count
    });

    if count % QUEUE_WAIT_SAMPLE_PERIOD == 0 {
        context.set_queue_wait_timepoint(Some(Instant::now()));
    } else {
        context.set_queue_wait_timepoint(None);
    }
}
