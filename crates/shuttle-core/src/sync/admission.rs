//! Admission gate: lets one contender at a time attempt lock acquisition

use crate::context::{self, Context, ContextId, Interrupted};
use crate::time::Instant;
use parking_lot::Mutex as ParkingLotMutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a contender waits for its turn at the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// Ignore cancellation; the flag stays raised for later
    Uninterruptibly,
    /// Abort with [`Interrupted`] on cancellation
    Interruptibly,
    /// Like `Interruptibly`, but give up at the deadline
    Until(Instant),
}

struct Waiter {
    context: Arc<Context>,
    /// Set by the releasing side when the gate is handed over (fair mode)
    granted: AtomicBool,
}

struct GateState {
    held: bool,
    queue: VecDeque<Arc<Waiter>>,
}

/// Outer gate of a [`PreemptibleLock`](super::PreemptibleLock)
///
/// In fair mode the gate is handed directly to the longest-waiting
/// contender, so admission order equals arrival order. In non-fair mode a
/// release just wakes the head of the queue and any arriving contender may
/// barge in ahead of it.
pub(crate) struct AdmissionGate {
    fair: bool,
    state: ParkingLotMutex<GateState>,
}

/// Proof of admission; releases the gate on drop
pub(crate) struct Admission<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl AdmissionGate {
    pub(crate) fn new(fair: bool) -> Self {
        Self {
            fair,
            state: ParkingLotMutex::new(GateState {
                held: false,
                queue: VecDeque::new(),
            }),
        }
    }

    pub(crate) fn is_fair(&self) -> bool {
        self.fair
    }

    /// Whether any contender is queued behind the current admission
    pub(crate) fn has_queued(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    /// Enter only if the gate is free and nobody is queued
    pub(crate) fn try_enter(&self) -> Option<Admission<'_>> {
        let mut state = self.state.lock();
        if state.held || !state.queue.is_empty() {
            return None;
        }
        state.held = true;
        Some(Admission { gate: self })
    }

    /// Enter the gate, ignoring cancellation while queued
    pub(crate) fn enter_uninterruptibly(&self) -> Admission<'_> {
        match self.enter(Wait::Uninterruptibly) {
            Ok(Some(admission)) => admission,
            _ => unreachable!("uninterruptible admission has no failure path"),
        }
    }

    /// Enter the gate, waiting as directed by `wait`
    ///
    /// Returns `Ok(None)` when a deadline elapses first.
    pub(crate) fn enter(&self, wait: Wait) -> Result<Option<Admission<'_>>, Interrupted> {
        if wait != Wait::Uninterruptibly {
            context::check_interrupt()?;
        }

        let waiter = {
            let mut state = self.state.lock();
            if !state.held && (state.queue.is_empty() || !self.fair) {
                state.held = true;
                return Ok(Some(Admission { gate: self }));
            }
            let waiter = Arc::new(Waiter {
                context: context::current(),
                granted: AtomicBool::new(false),
            });
            state.queue.push_back(Arc::clone(&waiter));
            waiter
        };

        loop {
            if self.fair {
                if waiter.granted.load(Ordering::Acquire) {
                    return Ok(Some(Admission { gate: self }));
                }
            } else {
                let mut state = self.state.lock();
                if !state.held {
                    state.held = true;
                    Self::dequeue(&mut state, &waiter);
                    return Ok(Some(Admission { gate: self }));
                }
            }

            match wait {
                Wait::Uninterruptibly => context::park(),
                Wait::Interruptibly => {
                    if context::take_interrupt() {
                        self.abandon(&waiter);
                        return Err(Interrupted);
                    }
                    context::park();
                }
                Wait::Until(deadline) => {
                    if context::take_interrupt() {
                        self.abandon(&waiter);
                        return Err(Interrupted);
                    }
                    if !Instant::now().is_before(deadline) {
                        self.abandon(&waiter);
                        return Ok(None);
                    }
                    context::park_until(deadline);
                }
            }
        }
    }

    /// Leave the queue after giving up; passes the gate on if it was
    /// granted to us concurrently
    fn abandon(&self, waiter: &Arc<Waiter>) {
        let mut state = self.state.lock();
        if waiter.granted.load(Ordering::Acquire) {
            drop(state);
            self.release();
            return;
        }
        Self::dequeue(&mut state, waiter);
        if !self.fair && !state.held {
            // a release may have targeted us; pass the wakeup along
            if let Some(next) = state.queue.front() {
                next.context.unpark();
            }
        }
    }

    fn dequeue(state: &mut GateState, waiter: &Arc<Waiter>) {
        state.queue.retain(|queued| !Arc::ptr_eq(queued, waiter));
    }

    fn release(&self) {
        let mut state = self.state.lock();
        if self.fair {
            match state.queue.pop_front() {
                Some(next) => {
                    // hand over without ever marking the gate free
                    next.granted.store(true, Ordering::Release);
                    next.context.unpark();
                }
                None => state.held = false,
            }
        } else {
            state.held = false;
            if let Some(next) = state.queue.front() {
                next.context.unpark();
            }
        }
    }

    /// IDs of queued contenders, head first
    pub(crate) fn queued(&self) -> Vec<ContextId> {
        self.state
            .lock()
            .queue
            .iter()
            .map(|waiter| waiter.context.id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    #[test]
    fn test_try_enter_fails_while_held() {
        let gate = AdmissionGate::new(false);
        let admission = gate.try_enter().unwrap();
        assert!(gate.try_enter().is_none());
        drop(admission);
        assert!(gate.try_enter().is_some());
    }

    #[test]
    fn test_enter_until_times_out() {
        let gate = AdmissionGate::new(true);
        let _held = gate.try_enter().unwrap();
        let deadline = Instant::now().add(Duration::of_millis(30));

        // cannot re-enter from the same thread; the gate is not reentrant
        let result = std::thread::scope(|s| {
            s.spawn(|| gate.enter(Wait::Until(deadline)).map(|a| a.is_some()))
                .join()
                .unwrap()
        });
        assert_eq!(result, Ok(false));
        assert!(!gate.has_queued());
    }

    #[test]
    fn test_fair_gate_hands_over_in_arrival_order() {
        let gate = Arc::new(AdmissionGate::new(true));
        std::mem::forget(gate.try_enter().unwrap());

        let order = Arc::new(ParkingLotMutex::new(Vec::new()));
        let mut threads = Vec::new();
        for i in 0..4 {
            let thread_gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            threads.push(std::thread::spawn(move || {
                let _admission = thread_gate.enter(Wait::Uninterruptibly).unwrap();
                order.lock().push(i);
            }));
            while gate.queued().len() < i + 1 {
                std::thread::yield_now();
            }
        }

        gate.release();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }
}
