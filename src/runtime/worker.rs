use crate::runtime::processor::ProcessorHandle;
use crate::runtime::queue::DEQUEUE_POLL_INTERVAL;
use crate::task::{TaskHandle, handle_key};
use crossbeam_channel::RecvTimeoutError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{error, warn};

/// Worker thread body.
///
/// Loops dequeue -> wait-time check -> one task step until the processor
/// stops. The step runs inside an unwind boundary: a panicking task body
/// is a task failure, never a scheduler failure.
pub(crate) fn run(handle: ProcessorHandle) {
    let shared = &handle.shared;
    let profiler_threshold = shared.config.profiler_threshold;

    loop {
        let Some(context) = dequeue(&handle) else { break };
        shared.queue.mark_dequeued();

        shared.check_wait_time(&*context);

        let step_started = (!profiler_threshold.is_zero()).then(Instant::now);

        let step = panic::catch_unwind(AssertUnwindSafe(|| context.do_step()));
        let has_failed = step.is_err();
        if let Err(payload) = step {
            error!(
                task_id = %context.task_id(),
                panic = panic_message(&*payload),
                "uncaught panic from task step"
            );
        }

        if let Some(started) = step_started {
            let elapsed = started.elapsed();
            if elapsed >= profiler_threshold {
                warn!(
                    task_id = %context.task_id(),
                    step_us = elapsed.as_micros() as u64,
                    "slow task step"
                );
            }
        }

        // A failed step is not observable through the is_detached ->
        // is_finished latch that adopt relies on, so clean the registry
        // unconditionally in that case.
        if has_failed || (context.is_detached() && context.is_finished()) {
            shared.detached.lock().remove(&handle_key(&context));
        }
    }
}

/// Dequeue one context, polling so the stop flag is observed during
/// shutdown. Returns `None` once the processor stops and a poll interval
/// has passed without work.
fn dequeue(handle: &ProcessorHandle) -> Option<TaskHandle> {
    let shared = &handle.shared;

    loop {
        match shared.queue.pop_timed(DEQUEUE_POLL_INTERVAL) {
            Ok(context) => return Some(context),
            Err(RecvTimeoutError::Timeout) => {
                if !shared.is_running.load(Ordering::Relaxed) {
                    return None;
                }
                shared.counter.account_task_switch_slow();
            }
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
