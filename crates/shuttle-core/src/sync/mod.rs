//! Synchronization primitives for hardware access
//!
//! [`PreemptibleLock`] serializes access to a single-owner device. Unlike an
//! ordinary mutex, a blocking acquisition interrupts the current holder so
//! the newest command wins instead of queueing behind stale work.

mod admission;
mod guard;
mod preemptible_lock;

pub use guard::{OwnedPreemptibleLockGuard, PreemptibleLockGuard};
pub use preemptible_lock::{LockError, PreemptibleLock};
