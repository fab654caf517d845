//! Shuttle Core
//!
//! Concurrency primitives for a robot hardware control runtime:
//! - **Clock**: monotonic instants and signed durations (`time` module)
//! - **Context**: execution-context identity, cancellation and parking (`context` module)
//! - **PreemptibleLock**: reentrant lock that interrupts its holder (`sync` module)
//! - **HardwareTaskScope**: fail-fast fork/join over OS threads (`scope` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use shuttle_core::{HardwareTaskScope, PreemptibleLock, TaskError};
//!
//! let lock = PreemptibleLock::new();
//! lock.lock_interruptibly()?;
//! // drive the device
//! lock.unlock()?;
//!
//! let scope = HardwareTaskScope::<String>::open();
//! scope.fork(|| Err(TaskError::Failed("stalled".into())));
//! assert!(scope.join().is_err());
//! scope.close()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Execution contexts, cancellation flags and parking
pub mod context;

/// Fail-fast task scopes
pub mod scope;

/// Preemptible lock and guards
pub mod sync;

/// Monotonic clock
pub mod time;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::{Context, ContextId, Interrupted};
pub use scope::{HardwareTaskScope, ScopeError, Subtask, SubtaskState, TaskError, TaskFault};
pub use sync::{LockError, OwnedPreemptibleLockGuard, PreemptibleLock, PreemptibleLockGuard};
pub use time::{Duration, Instant, Timeout};
