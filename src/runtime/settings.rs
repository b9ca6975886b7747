use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// What to do with a task once the processor is overloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverloadAction {
    /// Count the event and run the task anyway.
    #[default]
    Ignore,
    /// Count the event and request cancellation of non-critical tasks.
    Cancel,
}

const ACTION_IGNORE: u8 = 0;
const ACTION_CANCEL: u8 = 1;

/// The runtime-mutable tunables of one processor, plus the sticky
/// wait-time verdict.
///
/// Everything here is a single-word atomic read with relaxed ordering:
/// the values are advisory and a racing reader seeing the old value for
/// one more task is fine. Durations are stored as microseconds; zero
/// disables the corresponding policy.
#[derive(Debug)]
pub(crate) struct Settings {
    overload_action: AtomicU8,
    max_queue_length: AtomicUsize,
    max_queue_wait_time_us: AtomicU64,
    queue_wait_time_overloaded: AtomicBool,
}

impl Settings {
    pub(crate) fn new(
        action: OverloadAction,
        max_queue_length: usize,
        max_queue_wait_time: Duration,
    ) -> Self {
        let settings = Self {
            overload_action: AtomicU8::new(ACTION_IGNORE),
            max_queue_length: AtomicUsize::new(0),
            max_queue_wait_time_us: AtomicU64::new(0),
            queue_wait_time_overloaded: AtomicBool::new(false),
        };
        settings.update(action, max_queue_length, max_queue_wait_time);
        settings
    }

    pub(crate) fn update(
        &self,
        action: OverloadAction,
        max_queue_length: usize,
        max_queue_wait_time: Duration,
    ) {
        let action = match action {
            OverloadAction::Ignore => ACTION_IGNORE,
            OverloadAction::Cancel => ACTION_CANCEL,
        };
        self.overload_action.store(action, Ordering::Relaxed);
        self.max_queue_length
            .store(max_queue_length, Ordering::Relaxed);
        self.max_queue_wait_time_us
            .store(max_queue_wait_time.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn overload_action(&self) -> OverloadAction {
        match self.overload_action.load(Ordering::Relaxed) {
            ACTION_CANCEL => OverloadAction::Cancel,
            _ => OverloadAction::Ignore,
        }
    }

    pub(crate) fn max_queue_length(&self) -> usize {
        self.max_queue_length.load(Ordering::Relaxed)
    }

    pub(crate) fn max_queue_wait_time(&self) -> Duration {
        Duration::from_micros(self.max_queue_wait_time_us.load(Ordering::Relaxed))
    }

    pub(crate) fn queue_wait_time_overloaded(&self) -> bool {
        self.queue_wait_time_overloaded.load(Ordering::Relaxed)
    }

    pub(crate) fn set_queue_wait_time_overloaded(&self, overloaded: bool) {
        self.queue_wait_time_overloaded
            .store(overloaded, Ordering::Relaxed);
    }
}
