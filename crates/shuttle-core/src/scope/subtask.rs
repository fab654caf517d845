//! Subtask handles and their shared completion slots

use crate::context::Context;
use crate::scope::TaskError;
use once_cell::sync::OnceCell;
use parking_lot::Mutex as ParkingLotMutex;
use std::fmt;
use std::sync::Arc;

/// State of a forked subtask
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubtaskState {
    /// Forked and not yet finished
    Running,
    /// Completed with a value
    Succeeded,
    /// Failed before the scope shut down
    Failed,
    /// Never started, or finished without a usable result after shutdown
    Cancelled,
}

impl SubtaskState {
    /// Whether the subtask has reached a terminal state
    pub fn is_terminal(self) -> bool {
        self != SubtaskState::Running
    }
}

enum Slot<T, E> {
    Running,
    Succeeded(Option<T>),
    /// Holds the cause only for the first recorded failure of the scope
    Failed(Option<TaskError<E>>),
    Cancelled,
}

impl<T, E> Slot<T, E> {
    fn state(&self) -> SubtaskState {
        match self {
            Slot::Running => SubtaskState::Running,
            Slot::Succeeded(_) => SubtaskState::Succeeded,
            Slot::Failed(_) => SubtaskState::Failed,
            Slot::Cancelled => SubtaskState::Cancelled,
        }
    }
}

/// Outcome a subtask settles with
pub(crate) enum Settlement<T, E> {
    Succeeded(T),
    /// `Some` only if this failure won the first-failure race
    Failed(Option<TaskError<E>>),
    Cancelled,
}

/// Completion slot shared between a [`Subtask`] handle and its scope
pub(crate) struct SubtaskCell<T, E> {
    index: usize,
    context: OnceCell<Arc<Context>>,
    slot: ParkingLotMutex<Slot<T, E>>,
}

impl<T, E> SubtaskCell<T, E> {
    pub(crate) fn running(index: usize) -> Self {
        Self {
            index,
            context: OnceCell::new(),
            slot: ParkingLotMutex::new(Slot::Running),
        }
    }

    /// A cell for work that was never started
    pub(crate) fn cancelled(index: usize) -> Self {
        Self {
            index,
            context: OnceCell::new(),
            slot: ParkingLotMutex::new(Slot::Cancelled),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Attach the context running this subtask
    pub(crate) fn bind(&self, context: Arc<Context>) {
        let _ = self.context.set(context);
    }

    /// Move from `Running` to a terminal state; later settlements are ignored
    pub(crate) fn settle(&self, settlement: Settlement<T, E>) {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Running) {
            return;
        }
        *slot = match settlement {
            Settlement::Succeeded(value) => Slot::Succeeded(Some(value)),
            Settlement::Failed(cause) => Slot::Failed(cause),
            Settlement::Cancelled => Slot::Cancelled,
        };
    }
}

/// Type-erased view of a subtask used by the fan-out bookkeeping
pub(crate) trait Forked<E>: Send + Sync {
    fn state(&self) -> SubtaskState;

    /// Deliver a cancellation signal if the subtask is still running
    fn interrupt(&self) -> bool;

    /// Take the recorded failure cause, if this subtask holds it
    fn take_failure(&self) -> Option<TaskError<E>>;
}

impl<T: Send, E: Send> Forked<E> for SubtaskCell<T, E> {
    fn state(&self) -> SubtaskState {
        self.slot.lock().state()
    }

    fn interrupt(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        match self.context.get() {
            Some(context) => {
                context.interrupt();
                true
            }
            None => false,
        }
    }

    fn take_failure(&self) -> Option<TaskError<E>> {
        match &mut *self.slot.lock() {
            Slot::Failed(cause) => cause.take(),
            _ => None,
        }
    }
}

/// Handle to a unit of work forked into a scope
pub struct Subtask<T, E> {
    cell: Arc<SubtaskCell<T, E>>,
}

impl<T, E> Subtask<T, E> {
    pub(crate) fn new(cell: Arc<SubtaskCell<T, E>>) -> Self {
        Self { cell }
    }

    /// Current state
    pub fn state(&self) -> SubtaskState {
        self.cell.slot.lock().state()
    }

    /// Whether the subtask has reached a terminal state
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Move the produced value out (once) if the subtask succeeded
    pub fn take(&self) -> Option<T> {
        match &mut *self.cell.slot.lock() {
            Slot::Succeeded(value) => value.take(),
            _ => None,
        }
    }
}

impl<T: Clone, E> Subtask<T, E> {
    /// Clone the produced value if the subtask succeeded
    pub fn get(&self) -> Option<T> {
        match &*self.cell.slot.lock() {
            Slot::Succeeded(value) => value.clone(),
            _ => None,
        }
    }
}

impl<T, E> fmt::Debug for Subtask<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subtask")
            .field("index", &self.cell.index)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Interrupted;
    use std::convert::Infallible;

    #[test]
    fn test_settle_success_once() {
        let cell = Arc::new(SubtaskCell::<u32, Infallible>::running(0));
        let handle = Subtask::new(Arc::clone(&cell));
        assert_eq!(handle.state(), SubtaskState::Running);
        assert!(!handle.is_done());

        cell.settle(Settlement::Succeeded(7));
        cell.settle(Settlement::Cancelled);
        assert_eq!(handle.state(), SubtaskState::Succeeded);
        assert_eq!(handle.get(), Some(7));
        assert_eq!(handle.take(), Some(7));
        assert_eq!(handle.take(), None);
    }

    #[test]
    fn test_failure_cause_taken_once() {
        let cell = SubtaskCell::<(), Infallible>::running(3);
        cell.settle(Settlement::Failed(Some(TaskError::Interrupted(Interrupted))));
        assert_eq!(Forked::state(&cell), SubtaskState::Failed);
        assert!(matches!(
            cell.take_failure(),
            Some(TaskError::Interrupted(Interrupted))
        ));
        assert!(cell.take_failure().is_none());
        assert_eq!(cell.index(), 3);
    }

    #[test]
    fn test_cancelled_cell_is_never_interrupted() {
        let cell = SubtaskCell::<(), Infallible>::cancelled(0);
        cell.bind(crate::context::current());
        assert!(!cell.interrupt());
        assert!(!crate::context::current().is_interrupted());
    }
}
