//! Condition variable shared by fibers and plain threads.
//!
//! A waiter registers a handle on the FIFO, releases the caller's
//! [`Interlock`], suspends on the handle's channel and takes the interlock
//! back once woken. Fibers suspend only themselves through their
//! scheduler; plain threads park the OS thread.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::thread;
//!
//! use foundation_fibers::FiberCond;
//! use foundation_fibers::synca::{EventInterlock, Interlock};
//!
//! let cond = Arc::new(FiberCond::new());
//! let lock = Arc::new(EventInterlock::new());
//! let ready = Arc::new(AtomicBool::new(false));
//!
//! let (cond2, lock2, ready2) = (cond.clone(), lock.clone(), ready.clone());
//! let waiter = thread::spawn(move || {
//!     lock2.wait().unwrap();
//!     while !ready2.load(Ordering::SeqCst) {
//!         cond2.wait(&*lock2).unwrap();
//!     }
//!     lock2.notify().unwrap();
//! });
//!
//! lock.wait().unwrap();
//! ready.store(true, Ordering::SeqCst);
//! lock.notify().unwrap();
//! cond.signal().unwrap();
//!
//! waiter.join().unwrap();
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::errors::{fatal, CondError, CondResult, ProtocolViolation};
use crate::fiber;
use crate::synca::{ClaimGuard, Interlock};
use crate::waiter::poll::{wait_readable, Readiness};
use crate::waiter::{WaitQueue, WaiterHandle, WaiterSlot};

/// `FiberCond` provides pthread-style condition variable semantics to
/// fibers and plain threads at once.
///
/// - Waiters are woken in the order they registered.
/// - [`FiberCond::signal`] with nobody waiting is a successful no-op.
/// - A timed wait resolves exactly once, even when its timeout races a
///   signal aimed at it.
#[derive(Debug, Default)]
pub struct FiberCond {
    waiters: Mutex<WaitQueue>,

    /// decides which path confirms a delivery during a timed wait.
    guard: ClaimGuard,
}

/// A handle's membership in the queue for the duration of one wait.
///
/// Dropping it detaches the handle if it is still queued, closes the
/// channel and releases an allocated handle; every exit path of a wait runs
/// this exactly once.
struct Registration<'a> {
    cond: &'a FiberCond,
    slot: WaiterSlot,
}

impl Registration<'_> {
    fn handle(&self) -> &Arc<WaiterHandle> {
        self.slot.handle()
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let handle = self.slot.handle();
        let mut queue = self.cond.lock_waiters();
        handle.channel().close();
        queue.detach(handle);
        drop(queue);

        tracing::debug!(
            "Released waiter handle (owned: {})",
            self.slot.is_owned()
        );
    }
}

impl FiberCond {
    #[must_use]
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(WaitQueue::new()),
            guard: ClaimGuard::new(),
        }
    }

    /// Destroys the condition variable.
    ///
    /// Waiters borrow the condition variable for their whole wait, so none
    /// can still be registered once it can be consumed.
    pub fn free(self) {
        tracing::debug!("Freeing FiberCond with {} queued waiters", self.waiters());
    }

    fn lock_waiters(&self) -> MutexGuard<'_, WaitQueue> {
        self.waiters
            .lock()
            .unwrap_or_else(|_| fatal(ProtocolViolation::LockPoisoned("cond")))
    }

    /// Number of waiters currently registered.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.lock_waiters().len()
    }

    fn register(&self) -> CondResult<Registration<'_>> {
        let slot = WaiterSlot::acquire();
        slot.handle().channel().open()?;
        self.lock_waiters().push(Arc::clone(slot.handle()));

        tracing::debug!("Registered waiter (owned: {})", slot.is_owned());
        Ok(Registration { cond: self, slot })
    }

    /// Takes `handle` off the queue, returning false when a signaler had
    /// already dequeued it.
    fn withdraw(&self, handle: &Arc<WaiterHandle>) -> bool {
        self.lock_waiters().detach(handle)
    }

    /// Takes `handle` out of contention. A wakeup already committed to it is
    /// taken and passed on to the next waiter.
    fn relinquish(&self, handle: &Arc<WaiterHandle>) {
        if self.withdraw(handle) {
            return;
        }

        if let Err(err) = handle.channel().blocking_wait() {
            tracing::error!("Failed to take committed wakeup: {}", err);
        }

        if let Err(err) = self.signal() {
            tracing::error!("Failed to forward wakeup: {}", err);
        }
    }

    fn rendezvous<I: Interlock + ?Sized>(interlock: &I, context: &str) -> CondResult<()> {
        interlock.wait().map_err(|err| {
            tracing::error!("Interlock wait failed {}: {}", context, err);
            CondError::from(err)
        })
    }

    /// `wait` suspends the caller until a signal reaches it.
    ///
    /// The caller must hold `interlock`. It is released once the caller is
    /// registered and taken again before `wait` returns, as with a mutex and
    /// a pthread condition variable.
    ///
    /// # Errors
    ///
    /// Returns [`CondError::Interlock`] when the interlock refuses to be
    /// released or re-taken, and [`CondError::Channel`] when the waiter
    /// channel fails. The waiter is fully unregistered in either case.
    pub fn wait<I: Interlock + ?Sized>(&self, interlock: &I) -> CondResult<()> {
        let registration = self.register()?;

        if let Err(err) = interlock.notify() {
            tracing::error!("Interlock notify failed: {}", err);
            self.relinquish(registration.handle());
            return Err(err.into());
        }

        let delivered = registration.handle().channel().blocking_wait();
        if let Err(err) = &delivered {
            tracing::error!("Waiter channel failed: {}", err);
        }

        let rendezvous = Self::rendezvous(interlock, "after wakeup");

        drop(registration);
        delivered?;
        rendezvous?;
        Ok(())
    }

    /// `timed_wait` suspends the caller until a signal reaches it or
    /// `timeout` passes, whichever resolves the wait first.
    ///
    /// A waiter whose timeout fires after a signaler already took it off the
    /// queue still receives that signal and returns `Ok(())`, so no signal
    /// is lost to a racing timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CondError::TimedOut`] when the timeout expired first,
    /// [`CondError::Interlock`] or [`CondError::Channel`] on failures.
    ///
    /// # Panics
    ///
    /// Raises [`ProtocolViolation::GuardCorrupt`] if the claim guard is found
    /// in an impossible state.
    pub fn timed_wait<I: Interlock + ?Sized>(
        &self,
        interlock: &I,
        timeout: Duration,
    ) -> CondResult<()> {
        let registration = self.register()?;

        if let Err(err) = interlock.notify() {
            tracing::error!("Interlock notify failed: {}", err);
            self.relinquish(registration.handle());
            return Err(err.into());
        }

        let handle = registration.handle();
        let mut deadline = Instant::now().checked_add(timeout);

        loop {
            match wait_readable(handle.channel(), deadline) {
                Readiness::Ready => {}
                Readiness::TimedOut => {
                    if self.withdraw(handle) {
                        tracing::debug!("Timed wait expired after {:?}", timeout);
                        Self::rendezvous(interlock, "after timeout")?;
                        return Err(CondError::TimedOut);
                    }

                    tracing::debug!("Timed wait expired after being signalled, taking delivery");
                    deadline = None;
                    continue;
                }
                Readiness::Failed(err) => {
                    tracing::error!("Polling waiter channel failed: {}", err);
                    self.relinquish(handle);
                    Self::rendezvous(interlock, "after channel failure")?;
                    return Err(err.into());
                }
            }

            let claimed = {
                let _queue = self.lock_waiters();
                self.guard.claim()
            };
            if claimed {
                break;
            }
            fiber::yield_now();
        }

        let delivered = handle.channel().blocking_wait();
        self.guard.release();

        if let Err(err) = delivered {
            tracing::error!("Delivery confirmation failed: {}", err);
            Self::rendezvous(interlock, "after channel failure")?;
            return Err(err.into());
        }

        Self::rendezvous(interlock, "after wakeup")
    }

    /// `signal` wakes the longest waiting caller, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CondError::Channel`] when the dequeued waiter could not be
    /// woken. The queue itself is left consistent.
    pub fn signal(&self) -> CondResult<()> {
        self.signal_one().map(|_| ())
    }

    /// `signal_all` signals once per waiter registered at the time of the
    /// call, returning how many were woken.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first wakeup failure.
    pub fn signal_all(&self) -> CondResult<usize> {
        let registered = self.waiters();
        let mut woken = 0;
        while woken < registered && self.signal_one()? {
            woken += 1;
        }
        Ok(woken)
    }

    fn signal_one(&self) -> CondResult<bool> {
        let waiter = self.lock_waiters().pop();
        let Some(waiter) = waiter else {
            return Ok(false);
        };

        waiter.channel().wakeup().map_err(|err| {
            tracing::error!("Failed to wake waiter: {}", err);
            CondError::from(err)
        })?;
        Ok(true)
    }
}
