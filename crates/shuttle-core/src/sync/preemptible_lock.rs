//! Reentrant lock whose holder is interrupted when a new claimant arrives

use crate::context::{self, Context, ContextId, Interrupted};
use crate::sync::admission::{AdmissionGate, Wait};
use crate::time::{Duration, Instant};
use parking_lot::Mutex as ParkingLotMutex;
use std::fmt;
use std::sync::Arc;

/// Errors that can occur when using a [`PreemptibleLock`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// Unlock called by a context that does not hold the lock
    #[error("unlock called by {0}, which does not hold the lock")]
    NotOwner(ContextId),

    /// Cancelled while waiting for the lock
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Owner and reentrancy depth; `owner.is_none() == (hold_count == 0)`
struct LockState {
    owner: Option<Arc<Context>>,
    hold_count: usize,
    /// Contexts parked until the owner releases (the release condition)
    waiters: Vec<Arc<Context>>,
}

/// A reentrant lock that preempts its holder
///
/// Blocking acquisition does not just queue behind the current holder: it
/// interrupts the holder's context once, then waits for the release. A
/// holder blocked in an interruptible wait (sleeping, polling a device,
/// waiting on another lock) therefore gives the lock up promptly, and a
/// newer command supersedes an older in-flight one.
///
/// Two layers of synchronization are used. The admission gate lets exactly
/// one contender at a time attempt acquisition, which bounds preemption to
/// one interrupt per attempt and provides FIFO order in fair mode. The inner
/// state guard is held only long enough to read or update the owner and to
/// signal it, never while waiting.
pub struct PreemptibleLock {
    admission: AdmissionGate,
    state: ParkingLotMutex<LockState>,
}

impl PreemptibleLock {
    /// Create a non-fair lock
    pub fn new() -> Self {
        Self::with_fairness(false)
    }

    /// Create a lock that admits contenders in arrival order
    pub fn fair() -> Self {
        Self::with_fairness(true)
    }

    /// Create a lock with the given fairness policy
    pub fn with_fairness(fair: bool) -> Self {
        Self {
            admission: AdmissionGate::new(fair),
            state: ParkingLotMutex::new(LockState {
                owner: None,
                hold_count: 0,
                waiters: Vec::new(),
            }),
        }
    }

    /// Whether contenders are admitted in arrival order
    pub fn is_fair(&self) -> bool {
        self.admission.is_fair()
    }

    /// Whether any context currently holds the lock (point-in-time snapshot)
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Whether the calling context holds the lock
    pub fn is_held_by_current(&self) -> bool {
        let me = context::current_id();
        self.owner() == Some(me)
    }

    /// ID of the holding context, if any
    pub fn owner(&self) -> Option<ContextId> {
        self.state.lock().owner.as_ref().map(|owner| owner.id())
    }

    /// Reentrancy depth of the calling context (0 if it does not hold the lock)
    pub fn hold_count(&self) -> usize {
        let me = context::current_id();
        let state = self.state.lock();
        match &state.owner {
            Some(owner) if owner.id() == me => state.hold_count,
            _ => 0,
        }
    }

    /// Whether contenders are queued at the admission gate
    pub fn has_queued_contenders(&self) -> bool {
        self.admission.has_queued()
    }

    /// IDs of contenders queued at the admission gate, head first
    pub fn queued_contenders(&self) -> Vec<ContextId> {
        self.admission.queued()
    }

    /// Acquire the lock, preempting the holder; not cancellable
    ///
    /// A cancellation pending on the caller is preserved and does not abort
    /// the attempt.
    pub fn lock(&self) {
        let me = context::current();
        if self.reenter(&me) {
            return;
        }

        let _admission = self.admission.enter_uninterruptibly();
        match self.acquire(&me, Wait::Uninterruptibly) {
            Ok(true) => {}
            _ => unreachable!("uninterruptible acquire has no failure path"),
        }
    }

    /// Acquire the lock, preempting the holder; the caller's wait is
    /// cancellable
    ///
    /// Fails with [`Interrupted`] (consuming the flag) if a cancellation is
    /// pending on entry or arrives while waiting.
    pub fn lock_interruptibly(&self) -> Result<(), Interrupted> {
        context::check_interrupt()?;

        let me = context::current();
        if self.reenter(&me) {
            return Ok(());
        }

        let _admission = self.admission.enter(Wait::Interruptibly)?;
        self.acquire(&me, Wait::Interruptibly).map(|_| ())
    }

    /// Acquire the lock only if it is free and nobody else is contending
    ///
    /// Never preempts and never blocks. Reentrant attempts succeed.
    pub fn try_lock(&self) -> bool {
        let me = context::current();
        if self.reenter(&me) {
            return true;
        }

        let Some(_admission) = self.admission.try_enter() else {
            return false;
        };

        let mut state = self.state.lock();
        if state.owner.is_some() {
            return false;
        }
        state.owner = Some(me);
        state.hold_count = 1;
        true
    }

    /// Acquire the lock within `timeout`, preempting the holder at most once
    pub fn try_lock_for(&self, timeout: Duration) -> Result<bool, Interrupted> {
        self.try_lock_until(Instant::now().add(timeout))
    }

    /// Acquire the lock by `deadline`, preempting the holder at most once
    ///
    /// Returns `Ok(false)` if the deadline passes first; no second
    /// preemption is issued while waiting. The wait is cancellable.
    pub fn try_lock_until(&self, deadline: Instant) -> Result<bool, Interrupted> {
        let me = context::current();
        if self.reenter(&me) {
            return Ok(true);
        }

        let Some(_admission) = self.admission.enter(Wait::Until(deadline))? else {
            tracing::trace!(contender = %me, "admission timed out");
            return Ok(false);
        };
        self.acquire(&me, Wait::Until(deadline))
    }

    /// Release one hold; at zero the lock is freed and all waiters woken
    ///
    /// Calling this without holding the lock is a usage error and leaves the
    /// lock untouched.
    pub fn unlock(&self) -> Result<(), LockError> {
        let me = context::current_id();
        let mut state = self.state.lock();

        match &state.owner {
            Some(owner) if owner.id() == me => {}
            _ => {
                tracing::debug!(caller = %me, "unlock by non-owner rejected");
                return Err(LockError::NotOwner(me));
            }
        }

        state.hold_count -= 1;
        if state.hold_count == 0 {
            state.owner = None;
            for waiter in state.waiters.drain(..) {
                waiter.unpark();
            }
        }
        Ok(())
    }

    /// Take another hold if the caller already owns the lock
    fn reenter(&self, me: &Context) -> bool {
        let mut state = self.state.lock();
        match &state.owner {
            Some(owner) if owner.id() == me.id() => {
                state.hold_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Wait for the lock to be free and take it; the caller holds admission
    ///
    /// The current holder is interrupted once, on the first observation.
    /// Returns `Ok(false)` only when a deadline elapses.
    fn acquire(&self, me: &Arc<Context>, wait: Wait) -> Result<bool, Interrupted> {
        let mut preempted = false;

        loop {
            {
                let mut state = self.state.lock();
                match &state.owner {
                    None => {
                        state.owner = Some(Arc::clone(me));
                        state.hold_count = 1;
                        state.waiters.retain(|waiter| !Arc::ptr_eq(waiter, me));
                        if preempted {
                            tracing::trace!(owner = %me, "acquired after preemption");
                        }
                        return Ok(true);
                    }
                    Some(owner) => {
                        if !preempted {
                            tracing::debug!(holder = %owner, contender = %me, "preempting lock holder");
                            owner.interrupt();
                            preempted = true;
                        }
                        if !state.waiters.iter().any(|waiter| Arc::ptr_eq(waiter, me)) {
                            state.waiters.push(Arc::clone(me));
                        }
                    }
                }
            }

            match wait {
                Wait::Uninterruptibly => context::park(),
                Wait::Interruptibly => {
                    if context::take_interrupt() {
                        self.forget_waiter(me);
                        return Err(Interrupted);
                    }
                    context::park();
                }
                Wait::Until(deadline) => {
                    if context::take_interrupt() {
                        self.forget_waiter(me);
                        return Err(Interrupted);
                    }
                    if !Instant::now().is_before(deadline) {
                        self.forget_waiter(me);
                        tracing::trace!(contender = %me, "lock wait timed out");
                        return Ok(false);
                    }
                    context::park_until(deadline);
                }
            }
        }
    }

    fn forget_waiter(&self, me: &Arc<Context>) {
        self.state
            .lock()
            .waiters
            .retain(|waiter| !Arc::ptr_eq(waiter, me));
    }
}

impl Default for PreemptibleLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PreemptibleLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PreemptibleLock")
            .field("fair", &self.is_fair())
            .field("owner", &state.owner.as_ref().map(|owner| owner.id()))
            .field("hold_count", &state.hold_count)
            .finish()
    }
}
