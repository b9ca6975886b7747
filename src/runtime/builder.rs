use crate::runtime::TaskProcessor;
use crate::runtime::settings::OverloadAction;
use anyhow::Result;
use std::thread;
use std::time::Duration;

/// Linux caps pthread names at 16 bytes including the nul terminator.
const MAX_PTHREAD_NAME_LEN: usize = 16;

const DEFAULT_THREAD_NAME: &str = "treadle-wrk";

/// Bytes the `-{index}` suffix of the highest worker index occupies in
/// the pthread name.
fn worker_suffix_len(worker_threads: usize) -> usize {
    let max_index = worker_threads.saturating_sub(1);
    let digits = max_index.checked_ilog10().map_or(1, |d| d as usize + 1);
    1 + digits
}

/// Builder validation failures.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("thread_name must not be empty")]
    EmptyThreadName,

    #[error("thread_name `{0}` leaves no room for a worker index within the 15-byte pthread limit")]
    ThreadNameTooLong(String),
}

/// Builds a [`TaskProcessor`].
///
/// ```
/// use treadle::Builder;
/// use treadle::OverloadAction;
/// use std::time::Duration;
///
/// let processor = Builder::new()
///     .worker_threads(4)
///     .thread_name("my-pool")
///     .overload_action(OverloadAction::Cancel)
///     .max_queue_length(1024)
///     .max_queue_wait_time(Duration::from_millis(20))
///     .try_build()
///     .unwrap();
/// # drop(processor);
/// ```
#[derive(Debug)]
pub struct Builder {
    worker_threads: Option<usize>,
    thread_name: String,
    thread_stack_size: Option<usize>,
    profiler_threshold: Duration,
    overload_action: OverloadAction,
    max_queue_length: usize,
    max_queue_wait_time: Duration,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name: DEFAULT_THREAD_NAME.into(),
            thread_stack_size: None,
            profiler_threshold: Duration::ZERO,
            overload_action: OverloadAction::default(),
            max_queue_length: 0,
            max_queue_wait_time: Duration::ZERO,
        }
    }

    /// Number of worker threads. Defaults to the machine's available
    /// parallelism. Zero is accepted and spawns no workers, producing a
    /// processor whose queue is never drained.
    pub fn worker_threads(mut self, val: usize) -> Self {
        self.worker_threads = Some(val);
        self
    }

    /// Base name for worker threads; worker `i` is named `{base}-{i}`.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        self.thread_name = val.into();
        self
    }

    /// Stack size for worker threads. The platform minimum still applies.
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// Step durations at or above this threshold are logged as slow.
    /// Zero (the default) disables step timing entirely.
    pub fn profiler_threshold(mut self, val: Duration) -> Self {
        self.profiler_threshold = val;
        self
    }

    /// Initial overload action; mutable later through
    /// [`set_settings`](crate::runtime::ProcessorHandle::set_settings).
    pub fn overload_action(mut self, val: OverloadAction) -> Self {
        self.overload_action = val;
        self
    }

    /// Initial queue-length threshold; zero disables the length policy.
    pub fn max_queue_length(mut self, val: usize) -> Self {
        self.max_queue_length = val;
        self
    }

    /// Initial queue-wait-time threshold; zero disables the wait-time
    /// policy.
    pub fn max_queue_wait_time(mut self, val: Duration) -> Self {
        self.max_queue_wait_time = val;
        self
    }

    /// Validate the configuration and start the processor's workers.
    pub fn try_build(self) -> Result<TaskProcessor> {
        let cfg = self.try_into()?;
        TaskProcessor::start(cfg)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub(crate) struct ProcessorConfig {
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: String,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) profiler_threshold: Duration,
    pub(crate) overload_action: OverloadAction,
    pub(crate) max_queue_length: usize,
    pub(crate) max_queue_wait_time: Duration,
}

impl ProcessorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }

        // The suffix grows with the pool: worker 1000 needs five bytes.
        if self.thread_name.len() + worker_suffix_len(self.worker_threads)
            >= MAX_PTHREAD_NAME_LEN
        {
            return Err(ConfigError::ThreadNameTooLong(self.thread_name.clone()));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for ProcessorConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = match builder.worker_threads {
            Some(n) => n,
            None => thread::available_parallelism()?.get(),
        };

        let cfg = ProcessorConfig {
            worker_threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            profiler_threshold: builder.profiler_threshold,
            overload_action: builder.overload_action,
            max_queue_length: builder.max_queue_length,
            max_queue_wait_time: builder.max_queue_wait_time,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
