//! The task processor: worker pool, run queue, overload control.

mod builder;
pub(crate) mod counter;
pub(crate) mod processor;
mod queue;
mod settings;
mod worker;

pub use builder::{Builder, ConfigError};
pub use counter::{CounterToken, TaskCounter};
pub use processor::{ProcessorHandle, ProcessorStats, TaskProcessor};
pub use settings::OverloadAction;
