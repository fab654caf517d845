//! Failure causes surfaced by task scopes

use crate::context::{ContextId, Interrupted};
use crate::time::Timeout;
use std::any::Any;

/// A subtask panicked
///
/// Carries the original panic payload so the owner can re-raise it
/// unchanged with [`TaskFault::resume`].
#[derive(Debug, thiserror::Error)]
#[error("subtask panicked: {message}")]
pub struct TaskFault {
    message: String,
    payload: Box<dyn Any + Send>,
}

impl TaskFault {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message, payload }
    }

    pub(crate) fn from_message(message: String) -> Self {
        Self {
            payload: Box::new(message.clone()),
            message,
        }
    }

    /// The panic message, if the payload was a string
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Take the original panic payload
    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.payload
    }

    /// Continue unwinding with the original payload
    pub fn resume(self) -> ! {
        std::panic::resume_unwind(self.payload)
    }
}

/// How a subtask's work can fail
///
/// `E` is the one declared failure kind of the scope. Interruptible calls
/// inside the work convert with `?` through `From<Interrupted>`.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    /// The declared failure kind
    #[error("{0}")]
    Failed(E),

    /// The subtask observed a cancellation signal
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// The subtask panicked
    #[error(transparent)]
    Fault(#[from] TaskFault),
}

/// Everything the owner of a scope can observe
///
/// The first three variants are subtask causes, passed through unchanged.
/// `Timeout` comes from deadline-bound joins; the remaining variants are
/// usage errors.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError<E> {
    /// A subtask failed with the declared failure kind
    #[error("{0}")]
    Failed(E),

    /// A subtask, or the owner while joining, was cancelled
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// A deadline-bound join ran out of time
    #[error(transparent)]
    Timeout(#[from] Timeout),

    /// A subtask panicked
    #[error(transparent)]
    Fault(#[from] TaskFault),

    /// The scope was closed with forked work but was never joined
    #[error("scope closed without joining its forked subtasks")]
    NotJoined,

    /// Join or close called by a context other than the owner
    #[error("{caller} does not own this scope")]
    NotOwner {
        /// The offending caller
        caller: ContextId,
    },

    /// The scope was already closed
    #[error("scope is closed")]
    Closed,
}

impl<E> ScopeError<E> {
    /// Whether this is a programming error rather than a runtime outcome
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ScopeError::NotJoined | ScopeError::NotOwner { .. } | ScopeError::Closed
        )
    }
}

impl<E> From<TaskError<E>> for ScopeError<E> {
    fn from(error: TaskError<E>) -> Self {
        match error {
            TaskError::Failed(e) => ScopeError::Failed(e),
            TaskError::Interrupted(e) => ScopeError::Interrupted(e),
            TaskError::Fault(fault) => ScopeError::Fault(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn test_fault_message_from_str_and_string() {
        let fault = TaskFault::from_panic(Box::new("boom"));
        assert_eq!(fault.message(), "boom");

        let fault = TaskFault::from_panic(Box::new(String::from("bang")));
        assert_eq!(fault.message(), "bang");
        assert_eq!(fault.to_string(), "subtask panicked: bang");

        let fault = TaskFault::from_panic(Box::new(7_u32));
        assert_eq!(fault.message(), "non-string panic payload");
        assert_eq!(*fault.into_payload().downcast::<u32>().unwrap(), 7);
    }

    #[test]
    fn test_task_error_maps_onto_scope_error_unchanged() {
        let e: ScopeError<std::io::Error> =
            TaskError::Failed(std::io::Error::other("stalled")).into();
        match e {
            ScopeError::Failed(io) => assert_eq!(io.to_string(), "stalled"),
            other => panic!("unexpected {other:?}"),
        }

        let e: ScopeError<Infallible> = TaskError::Interrupted(Interrupted).into();
        assert!(matches!(e, ScopeError::Interrupted(Interrupted)));
        assert!(!e.is_usage_error());
    }

    #[test]
    fn test_usage_errors() {
        assert!(ScopeError::<Infallible>::NotJoined.is_usage_error());
        assert!(ScopeError::<Infallible>::Closed.is_usage_error());
        assert!(ScopeError::<Infallible>::NotOwner {
            caller: ContextId::new()
        }
        .is_usage_error());
    }
}
