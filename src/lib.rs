//! Scheduling substrate for a cooperative task runtime.
//!
//! Three pieces, leaves first:
//!
//! - [`sync::WaitList`]: the parking lot belonging to one
//!   synchronization object, guarded by a caller-visible lock token.
//! - [`runtime::TaskCounter`]: live-task accounting with
//!   wait-for-exhaustion, plus advisory overload counters.
//! - [`runtime::TaskProcessor`]: a worker-thread pool stepping
//!   cooperative tasks from an MPMC run queue, with queue-length and
//!   queue-wait-time overload policies, a detached-task registry and
//!   graceful shutdown.
//!
//! The coroutine machinery is not part of this crate: tasks are consumed
//! through the [`task::TaskContext`] trait, and everything higher up
//! (mutexes, condition variables, sleep, I/O) is built by parking
//! contexts on wait lists and scheduling them back onto a processor.

pub mod runtime;
pub use runtime::{
    Builder, ConfigError, CounterToken, OverloadAction, ProcessorHandle, ProcessorStats,
    TaskCounter, TaskProcessor,
};

pub mod sync;
pub use sync::{WaitList, WaitListLock};

pub mod task;
pub use task::{CancellationReason, TaskContext, TaskHandle, TaskId, WakeupSource};

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
