//! Suspension primitives built on top of the task interface.

mod wait_list;
pub use wait_list::{WaitList, WaitListLock};
