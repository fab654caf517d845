//! Cancel-all-on-first-failure fan-out
//!
//! [`FanOut`] runs each forked unit on its own thread with its own context.
//! The first unit to fail wins a compare-and-set on `first_failure` and shuts
//! the fan-out down, which interrupts every unit still running exactly once.
//! The owner waits on its own context's parker; every completion unparks it.

use crate::context::{self, Context, ContextId, Spawned};
use crate::scope::subtask::{Forked, Settlement, Subtask, SubtaskCell};
use crate::scope::{ScopeError, SubtaskState, TaskError, TaskFault};
use crate::time::{Instant, Timeout};
use parking_lot::Mutex as ParkingLotMutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const NO_FAILURE: usize = usize::MAX;

/// Fork/join bookkeeping, guarded by one short-held mutex
struct Book<E> {
    subtasks: Vec<Arc<dyn Forked<E>>>,
    threads: Vec<Spawned<()>>,
    completed: usize,
}

struct Shared<E> {
    owner: Arc<Context>,
    shutdown: AtomicBool,
    /// Index into `Book::subtasks` of the subtask whose failure won
    first_failure: AtomicUsize,
    book: ParkingLotMutex<Book<E>>,
}

impl<E: Send + 'static> Shared<E> {
    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return false;
        }
        let book = self.book.lock();
        let signalled = book
            .subtasks
            .iter()
            .filter(|subtask| subtask.interrupt())
            .count();
        tracing::debug!(owner = %self.owner, signalled, "scope shut down");
        true
    }

    /// Body of every subtask thread
    fn run<T, F>(&self, cell: &SubtaskCell<T, E>, work: F)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError<E>>,
    {
        if self.is_shutdown() {
            tracing::trace!(subtask = cell.index(), "cancelled before start");
            self.finish(cell, None);
            return;
        }
        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => result,
            Err(payload) => Err(TaskError::Fault(TaskFault::from_panic(payload))),
        };
        self.finish(cell, Some(outcome));
    }

    /// Settle a subtask and account for its completion
    fn finish<T>(&self, cell: &SubtaskCell<T, E>, outcome: Option<Result<T, TaskError<E>>>)
    where
        T: Send + 'static,
    {
        match outcome {
            None => cell.settle(Settlement::Cancelled),
            Some(Ok(value)) => cell.settle(Settlement::Succeeded(value)),
            Some(Err(_)) if self.is_shutdown() => {
                // causes arriving after shutdown are discarded
                cell.settle(Settlement::Cancelled);
            }
            Some(Err(cause)) => {
                let won = self
                    .first_failure
                    .compare_exchange(NO_FAILURE, cell.index(), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if won {
                    tracing::debug!(subtask = cell.index(), cause = ?KindOf(&cause), "first failure recorded");
                    cell.settle(Settlement::Failed(Some(cause)));
                } else {
                    cell.settle(Settlement::Failed(None));
                }
                self.shutdown();
            }
        }

        self.book.lock().completed += 1;
        self.owner.unpark();
    }
}

/// Logs only the kind of a cause; `E` need not be `Debug`
struct KindOf<'a, E>(&'a TaskError<E>);

impl<E> std::fmt::Debug for KindOf<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self.0 {
            TaskError::Failed(_) => "failed",
            TaskError::Interrupted(_) => "interrupted",
            TaskError::Fault(_) => "fault",
        })
    }
}

/// Runs a dynamic group of units, cancelling all of them on the first failure
pub(crate) struct FanOut<E> {
    shared: Arc<Shared<E>>,
    join_attempted: AtomicBool,
    closed: AtomicBool,
}

impl<E: Send + 'static> FanOut<E> {
    /// A fan-out owned by the calling context
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                owner: context::current(),
                shutdown: AtomicBool::new(false),
                first_failure: AtomicUsize::new(NO_FAILURE),
                book: ParkingLotMutex::new(Book {
                    subtasks: Vec::new(),
                    threads: Vec::new(),
                    completed: 0,
                }),
            }),
            join_attempted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn owner(&self) -> ContextId {
        self.shared.owner.id()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of units forked so far (excluding forks refused after shutdown)
    pub(crate) fn forked(&self) -> usize {
        self.shared.book.lock().subtasks.len()
    }

    /// Start `work` on a new thread; after shutdown or close nothing starts
    /// and the handle is already `Cancelled`
    pub(crate) fn fork<T, F>(&self, work: F) -> Subtask<T, E>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError<E>> + Send + 'static,
    {
        let (cell, spawn_error) = {
            let mut book = self.shared.book.lock();
            let index = book.subtasks.len();

            if self.is_shutdown() || self.is_closed() {
                tracing::debug!(subtask = index, "fork refused after shutdown");
                return Subtask::new(Arc::new(SubtaskCell::cancelled(index)));
            }

            let cell = Arc::new(SubtaskCell::running(index));
            book.subtasks.push(Arc::clone(&cell) as Arc<dyn Forked<E>>);

            let shared = Arc::clone(&self.shared);
            let worker_cell = Arc::clone(&cell);
            let name = format!("shuttle-subtask-{}-{}", self.shared.owner.id().as_u64(), index);
            match context::spawn(name, move || shared.run(&worker_cell, work)) {
                Ok(spawned) => {
                    cell.bind(Arc::clone(spawned.context()));
                    book.threads.push(spawned);
                    (cell, None)
                }
                Err(err) => (cell, Some(err)),
            }
        };

        if let Some(err) = spawn_error {
            let fault = TaskFault::from_message(format!("failed to spawn subtask thread: {err}"));
            self.shared.finish(&cell, Some(Err(TaskError::Fault(fault))));
        }
        Subtask::new(cell)
    }

    /// Idempotent; returns `true` for the call that actually shut down
    pub(crate) fn shutdown(&self) -> bool {
        self.shared.shutdown()
    }

    fn ensure_owner(&self) -> Result<(), ScopeError<E>> {
        let caller = context::current_id();
        if caller != self.owner() {
            return Err(ScopeError::NotOwner { caller });
        }
        Ok(())
    }

    /// Wait until every forked unit is terminal, then raise the first failure
    ///
    /// Cancellation of the owner while waiting shuts the fan-out down and is
    /// raised as `Interrupted`. With a deadline, `Timeout` is raised when it
    /// passes first; outstanding units keep running.
    pub(crate) fn join(&self, deadline: Option<Instant>) -> Result<(), ScopeError<E>> {
        self.ensure_owner()?;
        if self.is_closed() {
            return Err(ScopeError::Closed);
        }
        self.join_attempted.store(true, Ordering::SeqCst);
        let start = Instant::now();

        loop {
            if context::take_interrupt() {
                tracing::debug!(owner = %self.shared.owner, "owner interrupted while joining");
                self.shutdown();
                return Err(ScopeError::Interrupted(context::Interrupted));
            }

            {
                let book = self.shared.book.lock();
                if book.completed == book.subtasks.len() {
                    break;
                }
            }

            match deadline {
                Some(deadline) => {
                    if !Instant::now().is_before(deadline) {
                        return Err(ScopeError::Timeout(Timeout::since(start)));
                    }
                    context::park_until(deadline);
                }
                None => context::park(),
            }
        }

        match self.take_first_failure() {
            Some(cause) => Err(cause.into()),
            None => Ok(()),
        }
    }

    fn take_first_failure(&self) -> Option<TaskError<E>> {
        let index = self.shared.first_failure.load(Ordering::Acquire);
        if index == NO_FAILURE {
            return None;
        }
        let subtask = Arc::clone(self.shared.book.lock().subtasks.get(index)?);
        subtask.take_failure()
    }

    /// States of all forked units, in fork order
    pub(crate) fn states(&self) -> Vec<SubtaskState> {
        self.shared
            .book
            .lock()
            .subtasks
            .iter()
            .map(|subtask| subtask.state())
            .collect()
    }

    /// Owner-checked close
    pub(crate) fn close(&self) -> Result<(), ScopeError<E>> {
        self.ensure_owner()?;
        self.close_unchecked()
    }

    /// Close from `Drop`, where a usage error has nowhere to go
    pub(crate) fn close_on_drop(&self) {
        if self.is_closed() {
            return;
        }
        // NotJoined is already logged by close_unchecked
        let _ = self.close_unchecked();
    }

    /// Shut down, wait for every thread to exit, then report whether the
    /// forked work was ever joined
    fn close_unchecked(&self) -> Result<(), ScopeError<E>> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown();

        let threads = std::mem::take(&mut self.shared.book.lock().threads);
        for thread in threads {
            // subtask bodies catch panics, so the thread itself cannot fail
            let _ = thread.join();
        }

        if self.forked() > 0 && !self.join_attempted.load(Ordering::SeqCst) {
            tracing::warn!(owner = %self.shared.owner, "scope closed without join");
            return Err(ScopeError::NotJoined);
        }
        Ok(())
    }
}
