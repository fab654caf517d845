//! Fail-fast structured concurrency
//!
//! A [`HardwareTaskScope`] runs a group of hardware operations concurrently
//! under one owner and treats them as all-or-nothing: the first failure shuts
//! the group down and is the one cause the owner sees.

mod error;
mod fanout;
mod hardware;
mod subtask;

pub use error::{ScopeError, TaskError, TaskFault};
pub use hardware::HardwareTaskScope;
pub use subtask::{Subtask, SubtaskState};
