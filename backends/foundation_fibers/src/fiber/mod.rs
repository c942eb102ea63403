//! Cooperative fiber runtime the condition variable suspends into.
//!
//! A fiber is identified by a [`FiberRef`], which carries the
//! [`Scheduler`] it belongs to. The thread-local only remembers which fiber
//! the current OS thread is running; there is no process-wide scheduler.

use std::{
    cell::RefCell,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use derive_more::Display;

use crate::waiter::WaiterHandle;

mod config;
mod parker;
mod scheduler;

pub use config::*;
pub use parker::*;
pub use scheduler::*;

use scheduler::SchedulerInner;

/// Identity of a fiber within its scheduler.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("fiber-{_0}")]
pub struct FiberId(pub(crate) u64);

impl FiberId {
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Handle to a live fiber, usable from any thread to wake it.
#[derive(Clone)]
pub struct FiberRef {
    pub(crate) scheduler: Arc<SchedulerInner>,
    pub(crate) id: FiberId,
}

impl core::fmt::Debug for FiberRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("FiberRef").field(&self.id).finish()
    }
}

impl FiberRef {
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Suspends this fiber until [`Self::unpark`] is called.
    ///
    /// Must be called by the fiber itself. May return spuriously.
    pub fn park(&self) -> WakeReason {
        self.scheduler.park(self.id, None)
    }

    /// Suspends this fiber until unparked or until `dur` has passed.
    pub fn park_timeout(&self, dur: Duration) -> WakeReason {
        let deadline = Instant::now().checked_add(dur);
        self.scheduler.park(self.id, deadline)
    }

    /// Makes this fiber runnable again, or leaves a permit that satisfies
    /// its next park.
    pub fn unpark(&self) {
        self.scheduler.unpark(self.id);
    }

    /// Moves this fiber to the back of its scheduler's ready queue.
    pub fn yield_now(&self) {
        self.scheduler.yield_fiber(self.id);
    }

    #[must_use]
    pub fn same_as(&self, other: &FiberRef) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.scheduler, &other.scheduler)
    }
}

struct FiberContext {
    fiber: FiberRef,
    handle: Arc<WaiterHandle>,
}

thread_local! {
    static CURRENT_FIBER: RefCell<Option<FiberContext>> = const { RefCell::new(None) };
}

/// Records `fiber` as the fiber this OS thread runs, creating the waiter
/// handle every wait of that fiber borrows.
pub(crate) fn install_context(fiber: FiberRef) {
    let handle = Arc::new(WaiterHandle::new(Parker::Fiber(fiber.clone())));
    CURRENT_FIBER.with(|current| {
        *current.borrow_mut() = Some(FiberContext { fiber, handle });
    });
}

/// Returns the fiber running on this thread, or `None` on a plain thread.
#[must_use]
pub fn current() -> Option<FiberRef> {
    CURRENT_FIBER
        .try_with(|current| current.borrow().as_ref().map(|ctx| ctx.fiber.clone()))
        .ok()
        .flatten()
}

/// Returns the waiter handle owned by the running fiber.
#[must_use]
pub fn current_handle() -> Option<Arc<WaiterHandle>> {
    CURRENT_FIBER
        .try_with(|current| current.borrow().as_ref().map(|ctx| Arc::clone(&ctx.handle)))
        .ok()
        .flatten()
}

/// Yields the running fiber to the next ready one, or the OS thread when
/// called outside a fiber.
pub fn yield_now() {
    match current() {
        Some(fiber) => fiber.yield_now(),
        None => thread::yield_now(),
    }
}
