// Implements the event interlock a condition variable waiter rendezvous
// through, usable from fibers and plain threads alike.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::errors::InterlockError;
use crate::fiber::Parker;

/// `Interlock` is the rendezvous channel a waiter hands to
/// [`crate::FiberCond::wait`].
///
/// The condition variable calls [`Interlock::notify`] once the waiter is
/// registered, which is when other parties may proceed, and
/// [`Interlock::wait`] once the waiter has been woken.
pub trait Interlock {
    /// Marks the interlock ready for other parties. Fails only on misuse.
    ///
    /// # Errors
    ///
    /// Returns an [`InterlockError`] when the caller broke the protocol.
    fn notify(&self) -> Result<(), InterlockError>;

    /// Blocks until the rendezvous completes.
    ///
    /// # Errors
    ///
    /// Returns an [`InterlockError`] when the interlock can no longer be used.
    fn wait(&self) -> Result<(), InterlockError>;
}

/// `InterlockState` is the state of an [`EventInterlock`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterlockState {
    Free,
    Held,
}

#[derive(Debug)]
struct InterlockInner {
    state: InterlockState,

    /// parties blocked in `wait`, woken one per `notify`.
    parked: VecDeque<Parker>,
}

/// `EventInterlock` is a binary event: [`Interlock::wait`] takes it,
/// suspending the caller while someone else holds it, and
/// [`Interlock::notify`] hands it back and resumes the longest waiting
/// party.
///
/// Waiting suspends only the calling fiber when called from one, so a fiber
/// blocked here never stalls the other fibers of its scheduler.
#[derive(Debug)]
pub struct EventInterlock {
    inner: Mutex<InterlockInner>,
}

impl Default for EventInterlock {
    fn default() -> Self {
        Self::new()
    }
}

impl EventInterlock {
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(InterlockState::Free)
    }

    /// Creates an interlock already held by the caller.
    #[must_use]
    pub fn held() -> Self {
        Self::with_state(InterlockState::Held)
    }

    fn with_state(state: InterlockState) -> Self {
        Self {
            inner: Mutex::new(InterlockInner {
                state,
                parked: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, InterlockInner>, InterlockError> {
        self.inner.lock().map_err(|_| InterlockError::Poisoned)
    }

    /// # Errors
    ///
    /// Returns [`InterlockError::Poisoned`] if the state lock is poisoned.
    pub fn probe(&self) -> Result<InterlockState, InterlockError> {
        Ok(self.lock()?.state.clone())
    }

    /// Attempts to take the interlock without suspending, returning false
    /// when someone else holds it.
    ///
    /// # Errors
    ///
    /// Returns [`InterlockError::Poisoned`] if the state lock is poisoned.
    pub fn try_wait(&self) -> Result<bool, InterlockError> {
        let mut inner = self.lock()?;
        if inner.state == InterlockState::Held {
            return Ok(false);
        }
        inner.state = InterlockState::Held;
        Ok(true)
    }

    /// Number of parties suspended in `wait`.
    ///
    /// # Errors
    ///
    /// Returns [`InterlockError::Poisoned`] if the state lock is poisoned.
    pub fn parked(&self) -> Result<usize, InterlockError> {
        Ok(self.lock()?.parked.len())
    }
}

impl Interlock for EventInterlock {
    fn notify(&self) -> Result<(), InterlockError> {
        let mut inner = self.lock()?;
        if inner.state != InterlockState::Held {
            tracing::error!("EventInterlock notified while free");
            return Err(InterlockError::NotHeld);
        }

        inner.state = InterlockState::Free;
        let next = inner.parked.pop_front();
        drop(inner);

        if let Some(next) = next {
            next.unpark();
        }
        Ok(())
    }

    fn wait(&self) -> Result<(), InterlockError> {
        let me = Parker::current();
        loop {
            let mut inner = self.lock()?;
            if inner.state == InterlockState::Free {
                inner.state = InterlockState::Held;
                inner.parked.retain(|parked| !parked.same_as(&me));
                return Ok(());
            }

            if !inner.parked.iter().any(|parked| parked.same_as(&me)) {
                inner.parked.push_back(me.clone());
            }
            drop(inner);

            tracing::debug!("EventInterlock is held, suspending");
            me.park();
        }
    }
}
