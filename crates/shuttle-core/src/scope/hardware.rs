//! Typed fork/join surface for concurrent hardware operations

use crate::context::ContextId;
use crate::scope::fanout::FanOut;
use crate::scope::{ScopeError, Subtask, SubtaskState, TaskError};
use crate::time::{Duration, Instant};
use std::convert::Infallible;
use std::fmt;

/// A structured concurrency scope that fails fast
///
/// Every unit of work is forked onto its own thread. If any of them fails,
/// the scope shuts down: each sibling still running receives one
/// cancellation signal, and the first failure is raised to the owner from
/// [`join`](Self::join). A partial success has no meaning for hardware
/// operations, so there is no way to collect results past a failure.
///
/// `E` is the one declared failure kind; work that cannot fail except by
/// cancellation or panic uses the default `Infallible`.
///
/// The scope belongs to the context that opened it. Only that context may
/// join or close it. Dropping a scope closes it.
///
/// ```text
/// let scope = HardwareTaskScope::<ControlError>::open();
/// scope.fork(move || left.go_to_position(0.2).map_err(TaskError::Failed));
/// scope.fork(move || right.go_to_position(0.2).map_err(TaskError::Failed));
/// scope.join()?;
/// scope.close()?;
/// ```
pub struct HardwareTaskScope<E: Send + 'static = Infallible> {
    fan_out: FanOut<E>,
}

impl<E: Send + 'static> HardwareTaskScope<E> {
    /// Open a scope owned by the calling context
    pub fn open() -> Self {
        let fan_out = FanOut::new();
        tracing::trace!(owner = %fan_out.owner(), "scope opened");
        Self { fan_out }
    }

    /// The owning context
    pub fn owner(&self) -> ContextId {
        self.fan_out.owner()
    }

    /// Fork a unit of work that produces no value
    pub fn fork<F>(&self, task: F) -> Subtask<(), E>
    where
        F: FnOnce() -> Result<(), TaskError<E>> + Send + 'static,
    {
        self.fan_out.fork(task)
    }

    /// Fork a unit of work that produces a value of type `T`
    ///
    /// The value is available from the handle once the subtask succeeded.
    pub fn fork_supplier<T, F>(&self, supplier: F) -> Subtask<T, E>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError<E>> + Send + 'static,
    {
        self.fan_out.fork(supplier)
    }

    /// Wait for every forked unit to finish; raise the first failure
    ///
    /// If the owner is cancelled while waiting, the scope shuts down and
    /// `Interrupted` is raised.
    pub fn join(&self) -> Result<(), ScopeError<E>> {
        self.fan_out.join(None)
    }

    /// [`join`](Self::join) bounded by `deadline`
    ///
    /// Raises `Timeout` if the deadline passes first. Outstanding work is not
    /// cancelled; call [`shutdown`](Self::shutdown) for that.
    pub fn join_until(&self, deadline: Instant) -> Result<(), ScopeError<E>> {
        self.fan_out.join(Some(deadline))
    }

    /// [`join_until`](Self::join_until) with a relative timeout
    pub fn join_for(&self, timeout: Duration) -> Result<(), ScopeError<E>> {
        self.join_until(Instant::now().add(timeout))
    }

    /// Cancel all running work; idempotent
    pub fn shutdown(&self) {
        self.fan_out.shutdown();
    }

    /// Whether the scope has shut down
    pub fn is_shutdown(&self) -> bool {
        self.fan_out.is_shutdown()
    }

    /// States of all forked units, in fork order
    pub fn subtask_states(&self) -> Vec<SubtaskState> {
        self.fan_out.states()
    }

    /// Shut down and wait for every subtask thread to exit
    ///
    /// Returns `NotJoined` if work was forked but never joined, even when
    /// that work already finished.
    pub fn close(self) -> Result<(), ScopeError<E>> {
        self.fan_out.close()
    }
}

impl<E: Send + 'static> Drop for HardwareTaskScope<E> {
    fn drop(&mut self) {
        self.fan_out.close_on_drop();
    }
}

impl<E: Send + 'static> fmt::Debug for HardwareTaskScope<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareTaskScope")
            .field("owner", &self.owner())
            .field("shutdown", &self.is_shutdown())
            .field("forked", &self.fan_out.forked())
            .finish()
    }
}
