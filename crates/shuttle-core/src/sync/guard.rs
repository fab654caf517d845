//! RAII guards for automatic preemptible-lock release

use crate::context::Interrupted;
use crate::sync::{LockError, PreemptibleLock};
use crate::time::{Duration, Instant};
use std::marker::PhantomData;
use std::sync::Arc;

/// Makes guards `!Send`: a hold belongs to the context that acquired it
type NotSend = PhantomData<*const ()>;

/// RAII guard for [`PreemptibleLock`] (releases one hold on drop)
///
/// This guard ensures that the lock is released when the guard goes out of
/// scope, including while unwinding from a panic.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct PreemptibleLockGuard<'a> {
    lock: &'a PreemptibleLock,
    unlocked: bool,
    _not_send: NotSend,
}

impl<'a> PreemptibleLockGuard<'a> {
    fn new(lock: &'a PreemptibleLock) -> Self {
        Self {
            lock,
            unlocked: false,
            _not_send: PhantomData,
        }
    }

    /// Release the hold early (before drop)
    pub fn unlock(mut self) -> Result<(), LockError> {
        self.unlocked = true;
        self.lock.unlock()
    }

    /// The guarded lock
    pub fn lock(&self) -> &PreemptibleLock {
        self.lock
    }
}

impl Drop for PreemptibleLockGuard<'_> {
    fn drop(&mut self) {
        if !self.unlocked {
            // the guard was created by the owning context, so this cannot fail
            let _ = self.lock.unlock();
        }
    }
}

/// RAII guard for `Arc<PreemptibleLock>` (owned version)
///
/// This version owns an Arc to the lock, allowing it to outlive the
/// original lock reference.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct OwnedPreemptibleLockGuard {
    lock: Arc<PreemptibleLock>,
    unlocked: bool,
    _not_send: NotSend,
}

impl OwnedPreemptibleLockGuard {
    fn new(lock: Arc<PreemptibleLock>) -> Self {
        Self {
            lock,
            unlocked: false,
            _not_send: PhantomData,
        }
    }

    /// Release the hold early (before drop)
    pub fn unlock(mut self) -> Result<(), LockError> {
        self.unlocked = true;
        self.lock.unlock()
    }

    /// Get a reference to the lock
    pub fn lock(&self) -> &Arc<PreemptibleLock> {
        &self.lock
    }
}

impl Drop for OwnedPreemptibleLockGuard {
    fn drop(&mut self) {
        if !self.unlocked {
            let _ = self.lock.unlock();
        }
    }
}

impl PreemptibleLock {
    /// [`lock`](Self::lock) returning a guard
    pub fn lock_guard(&self) -> PreemptibleLockGuard<'_> {
        self.lock();
        PreemptibleLockGuard::new(self)
    }

    /// [`lock_interruptibly`](Self::lock_interruptibly) returning a guard
    pub fn lock_interruptibly_guard(&self) -> Result<PreemptibleLockGuard<'_>, Interrupted> {
        self.lock_interruptibly()?;
        Ok(PreemptibleLockGuard::new(self))
    }

    /// [`try_lock`](Self::try_lock) returning a guard on success
    pub fn try_lock_guard(&self) -> Option<PreemptibleLockGuard<'_>> {
        self.try_lock().then(|| PreemptibleLockGuard::new(self))
    }

    /// [`try_lock_for`](Self::try_lock_for) returning a guard on success
    pub fn try_lock_guard_for(
        &self,
        timeout: Duration,
    ) -> Result<Option<PreemptibleLockGuard<'_>>, Interrupted> {
        Ok(self
            .try_lock_for(timeout)?
            .then(|| PreemptibleLockGuard::new(self)))
    }

    /// [`try_lock_until`](Self::try_lock_until) returning a guard on success
    pub fn try_lock_guard_until(
        &self,
        deadline: Instant,
    ) -> Result<Option<PreemptibleLockGuard<'_>>, Interrupted> {
        Ok(self
            .try_lock_until(deadline)?
            .then(|| PreemptibleLockGuard::new(self)))
    }

    /// [`lock`](Self::lock) on a shared lock, returning an owned guard
    pub fn lock_owned(self: &Arc<Self>) -> OwnedPreemptibleLockGuard {
        self.lock();
        OwnedPreemptibleLockGuard::new(Arc::clone(self))
    }

    /// [`lock_interruptibly`](Self::lock_interruptibly) on a shared lock,
    /// returning an owned guard
    pub fn lock_interruptibly_owned(
        self: &Arc<Self>,
    ) -> Result<OwnedPreemptibleLockGuard, Interrupted> {
        self.lock_interruptibly()?;
        Ok(OwnedPreemptibleLockGuard::new(Arc::clone(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;

    #[test]
    fn test_guard_auto_unlock() {
        let lock = PreemptibleLock::new();

        {
            let _guard = lock.lock_guard();
            assert!(lock.is_locked());
            assert!(lock.is_held_by_current());
        } // Guard dropped here

        assert!(!lock.is_locked());
    }

    #[test]
    fn test_guard_manual_unlock() {
        let lock = PreemptibleLock::new();

        let guard = lock.lock_guard();
        assert!(lock.is_locked());
        assert_eq!(guard.unlock(), Ok(()));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_nested_guards_release_one_hold_each() {
        let lock = PreemptibleLock::new();
        let outer = lock.lock_guard();
        {
            let _inner = lock.try_lock_guard().unwrap();
            assert_eq!(lock.hold_count(), 2);
        }
        assert_eq!(lock.hold_count(), 1);
        drop(outer);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_guard_releases_during_unwind() {
        let lock = PreemptibleLock::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = lock.lock_guard();
            panic!("device fault");
        }));
        assert!(result.is_err());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_interruptible_guard_fails_when_interrupted() {
        let lock = PreemptibleLock::new();
        context::current().interrupt();
        assert!(lock.lock_interruptibly_guard().is_err());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_timed_guard_on_free_lock() {
        let lock = PreemptibleLock::new();
        let guard = lock
            .try_lock_guard_until(Instant::now().add(Duration::of_millis(50)))
            .unwrap()
            .unwrap();
        assert_eq!(lock.hold_count(), 1);
        drop(guard);

        let guard = lock.try_lock_guard_for(Duration::of_millis(50)).unwrap();
        assert!(guard.is_some());
        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_owned_guard() {
        let lock = Arc::new(PreemptibleLock::new());

        {
            let guard = lock.lock_owned();
            assert!(guard.lock().is_locked());
        } // Guard dropped here

        assert!(!lock.is_locked());

        let guard = lock.lock_interruptibly_owned().unwrap();
        assert_eq!(guard.unlock(), Ok(()));
        assert!(!lock.is_locked());
    }
}
