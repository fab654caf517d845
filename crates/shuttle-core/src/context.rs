//! Execution contexts and cooperative cancellation
//!
//! Every OS thread that touches a primitive in this crate runs inside a
//! [`Context`]: an opaque identity plus a cancellation ("interrupt") flag and
//! a parker. All blocking waits in the crate park the current context, so
//! [`Context::interrupt`] can wake them without knowing what they wait on.
//!
//! Interruptible waits observe the flag, clear it, and return
//! [`Interrupted`]. Uninterruptible waits re-park and leave the flag set for
//! whoever checks next.

use crate::time::{Duration, Instant};
use crossbeam::sync::{Parker, Unparker};
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Unique identifier for an execution context
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    /// Generate a new unique ContextId
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// A cancellation signal was observed by an interruptible operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted")]
pub struct Interrupted;

/// A unit of execution that can be identified, parked and interrupted
pub struct Context {
    id: ContextId,
    name: Option<String>,
    interrupted: AtomicBool,
    interrupts_received: AtomicU64,
    unparker: Unparker,
}

impl Context {
    fn new(name: Option<String>, parker: &Parker) -> Arc<Self> {
        Arc::new(Self {
            id: ContextId::new(),
            name,
            interrupted: AtomicBool::new(false),
            interrupts_received: AtomicU64::new(0),
            unparker: parker.unparker().clone(),
        })
    }

    /// Get the context's unique ID
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Name of the thread the context was created for, if it had one
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Raise the cancellation flag and wake the context if it is parked
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.interrupts_received.fetch_add(1, Ordering::Relaxed);
        self.unparker.unpark();
        tracing::trace!(context = %self, "interrupt delivered");
    }

    /// Whether the cancellation flag is raised (does not clear it)
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Total number of cancellation signals ever delivered to this context
    pub fn interrupts_received(&self) -> u64 {
        self.interrupts_received.load(Ordering::Relaxed)
    }

    /// Whether this is the calling thread's context
    pub fn is_current(&self) -> bool {
        current_id() == self.id
    }

    /// Wake the context without raising its flag
    pub(crate) fn unpark(&self) {
        self.unparker.unpark();
    }

    fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}@{}", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

struct Local {
    context: Arc<Context>,
    parker: Parker,
}

thread_local! {
    static CURRENT: RefCell<Option<Local>> = const { RefCell::new(None) };
}

fn with_local<R>(f: impl FnOnce(&Local) -> R) -> R {
    CURRENT.with(|cell| {
        if cell.borrow().is_none() {
            let parker = Parker::new();
            let name = thread::current().name().map(str::to_owned);
            let context = Context::new(name, &parker);
            *cell.borrow_mut() = Some(Local { context, parker });
        }
        let local = cell.borrow();
        match local.as_ref() {
            Some(local) => f(local),
            None => unreachable!("context initialised above"),
        }
    })
}

fn install(context: Arc<Context>, parker: Parker) {
    CURRENT.with(|cell| *cell.borrow_mut() = Some(Local { context, parker }));
}

/// The calling thread's context, created on first use
pub fn current() -> Arc<Context> {
    with_local(|local| Arc::clone(&local.context))
}

/// ID of the calling thread's context
pub fn current_id() -> ContextId {
    with_local(|local| local.context.id)
}

/// Clear the calling context's cancellation flag, returning its old value
pub fn take_interrupt() -> bool {
    with_local(|local| local.context.take_interrupt())
}

/// Fail with [`Interrupted`] (consuming the flag) if a cancellation is pending
pub fn check_interrupt() -> Result<(), Interrupted> {
    if take_interrupt() {
        Err(Interrupted)
    } else {
        Ok(())
    }
}

/// Park the calling context until it is unparked or interrupted
///
/// May return spuriously; callers re-check their condition in a loop.
pub fn park() {
    with_local(|local| local.parker.park());
}

/// Park the calling context until unparked, interrupted or `deadline`
///
/// May return spuriously; callers re-check their condition in a loop.
pub fn park_until(deadline: Instant) {
    with_local(|local| match deadline.to_std() {
        Some(deadline) => local.parker.park_deadline(deadline),
        None => local.parker.park(),
    });
}

/// Interruptible sleep
///
/// Returns [`Interrupted`] (and clears the flag) if the context is cancelled
/// before or during the sleep.
pub fn sleep(duration: Duration) -> Result<(), Interrupted> {
    sleep_until(Instant::now().add(duration))
}

/// Interruptible sleep until `deadline`
pub fn sleep_until(deadline: Instant) -> Result<(), Interrupted> {
    loop {
        check_interrupt()?;
        if !Instant::now().is_before(deadline) {
            return Ok(());
        }
        park_until(deadline);
    }
}

/// A thread started with its own, already-known context
pub struct Spawned<T> {
    context: Arc<Context>,
    handle: JoinHandle<T>,
}

impl<T> Spawned<T> {
    /// The spawned thread's context (usable before the thread starts running)
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Whether the thread has finished running
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread to finish
    pub fn join(self) -> thread::Result<T> {
        self.handle.join()
    }
}

/// Spawn an OS thread whose context is created up front
///
/// The returned handle exposes the context immediately, so the caller can
/// interrupt the thread even before it has been scheduled.
pub fn spawn<F, T>(name: impl Into<String>, f: F) -> io::Result<Spawned<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let parker = Parker::new();
    let context = Context::new(Some(name.clone()), &parker);
    let installed = Arc::clone(&context);

    let handle = thread::Builder::new().name(name).spawn(move || {
        install(installed, parker);
        f()
    })?;

    Ok(Spawned { context, handle })
}
