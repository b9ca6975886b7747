//! The task-context interface consumed by the processor.
//!
//! The coroutine machinery itself (stack switching, body execution) lives
//! outside this crate. The scheduling substrate only needs the narrow
//! surface below: step the task, cancel it, wake it, and read a handful of
//! flags. Everything is accessed through shared [`TaskHandle`]s; the
//! reference count lives inside the task allocation, so moving a handle
//! through the run queue is a single atomic increment and no allocation.

use std::sync::Arc;
use std::time::Instant;

pub mod id;
pub use id::TaskId;

/// Why a task is being asked to cancel itself.
///
/// Cancellation is a non-blocking hint: the target observes it at its next
/// checkpoint and unwinds cooperatively. Nothing is force-unwound from the
/// outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// The owning processor is shutting down.
    Shutdown,
    /// The task was shed by overload control.
    Overload,
    /// The task's owner asked for cancellation.
    UserRequest,
}

/// What woke a suspended task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupSource {
    /// A [`WaitList`](crate::sync::WaitList) wake pass consumed the task's
    /// slot.
    WaitList,
    /// A cancellation request interrupted the suspension. The context is
    /// expected to call [`WaitList::remove`](crate::sync::WaitList::remove)
    /// for itself before resuming.
    Cancel,
}

/// One cooperative task, as seen by the scheduling substrate.
///
/// # Flag ordering
///
/// `set_detached`/`is_finished` participate in the adopt/cleanup latch:
/// [`adopt`](crate::runtime::ProcessorHandle::adopt) flips the detached
/// flag under the registry mutex while the worker reads both flags outside
/// it. Implementations must store and load `is_finished`/`is_detached`
/// with sequentially consistent ordering so that at least one side of that
/// race observes the other's write.
pub trait TaskContext: Send + Sync + std::fmt::Debug {
    /// Identifier used in diagnostics.
    fn task_id(&self) -> TaskId;

    /// Advance the task by one cooperative step: from resume to the next
    /// suspension point or to completion. May panic; the worker frame
    /// isolates the panic from the scheduler loop.
    fn do_step(&self);

    /// Hint the task to cancel itself. Must not block.
    fn request_cancel(&self, reason: CancellationReason);

    /// Reschedule the task onto its owning processor. Idempotent within
    /// one suspension.
    fn wakeup(&self, source: WakeupSource);

    /// Stamp the instant the task entered the run queue, or `None` when
    /// the enqueue was not sampled.
    fn set_queue_wait_timepoint(&self, timepoint: Option<Instant>);
    fn queue_wait_timepoint(&self) -> Option<Instant>;

    /// Critical tasks are exempt from overload-based cancellation.
    fn is_critical(&self) -> bool;

    /// One-way transition; see the flag-ordering note above.
    fn set_detached(&self);
    fn is_detached(&self) -> bool;

    fn is_finished(&self) -> bool;
}

/// Shared-ownership handle to a task context.
pub type TaskHandle = Arc<dyn TaskContext>;

/// Handles are compared by the identity of the task allocation.
pub(crate) fn handle_eq(a: &TaskHandle, b: &TaskHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Map key for the detached-context registry.
pub(crate) fn handle_key(handle: &TaskHandle) -> usize {
    Arc::as_ptr(handle) as *const () as usize
}
