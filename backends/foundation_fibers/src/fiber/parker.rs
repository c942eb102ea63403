use std::{thread, time::Duration};

use super::FiberRef;

/// `Parker` is how a waiter gets suspended and resumed.
///
/// A fiber suspends only itself and hands its scheduler's baton to the next
/// ready fiber; a plain thread parks the OS thread. Both follow
/// [`std::thread::park`] semantics: an unpark that arrives first is kept as a
/// permit, and a park may return spuriously, so callers re-check their
/// condition in a loop.
#[derive(Clone, Debug)]
pub enum Parker {
    Fiber(FiberRef),
    Thread(thread::Thread),
}

impl Parker {
    /// Returns the parker for whoever is calling: the running fiber when
    /// there is one, else the current OS thread.
    #[must_use]
    pub fn current() -> Self {
        match super::current() {
            Some(fiber) => Parker::Fiber(fiber),
            None => Parker::Thread(thread::current()),
        }
    }

    #[must_use]
    pub fn is_fiber(&self) -> bool {
        matches!(self, Parker::Fiber(_))
    }

    /// Suspends the caller. Must be called by the owner of this parker.
    pub fn park(&self) {
        match self {
            Parker::Fiber(fiber) => {
                let _ = fiber.park();
            }
            Parker::Thread(owner) => {
                debug_assert_eq!(owner.id(), thread::current().id());
                thread::park();
            }
        }
    }

    /// Suspends the caller for at most `dur`.
    pub fn park_timeout(&self, dur: Duration) {
        match self {
            Parker::Fiber(fiber) => {
                let _ = fiber.park_timeout(dur);
            }
            Parker::Thread(owner) => {
                debug_assert_eq!(owner.id(), thread::current().id());
                thread::park_timeout(dur);
            }
        }
    }

    /// Resumes the owner of this parker. Callable from any thread or fiber.
    pub fn unpark(&self) {
        match self {
            Parker::Fiber(fiber) => fiber.unpark(),
            Parker::Thread(owner) => owner.unpark(),
        }
    }

    #[must_use]
    pub fn same_as(&self, other: &Parker) -> bool {
        match (self, other) {
            (Parker::Fiber(left), Parker::Fiber(right)) => left.same_as(right),
            (Parker::Thread(left), Parker::Thread(right)) => left.id() == right.id(),
            _ => false,
        }
    }
}
