use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::errors::ChannelError;
use crate::fiber::Parker;

use super::poll::{PollEvent, Pollable};

/// `WaiterChannel` is the suspend/wakeup endpoint embedded in every waiter
/// handle.
///
/// Wakeups are counted, so one posted before its owner suspends is not lost;
/// the owner consumes them one at a time through [`Self::blocking_wait`].
#[derive(Debug)]
pub struct WaiterChannel {
    parker: Parker,
    open: AtomicBool,
    pending: AtomicU64,
}

impl WaiterChannel {
    pub(crate) fn new(parker: Parker) -> Self {
        Self {
            parker,
            open: AtomicBool::new(false),
            pending: AtomicU64::new(0),
        }
    }

    /// # Errors
    ///
    /// Returns [`ChannelError::AlreadyOpen`] when the channel is in use.
    pub fn open(&self) -> Result<(), ChannelError> {
        if self.open.load(Ordering::Acquire) {
            return Err(ChannelError::AlreadyOpen);
        }
        self.pending.store(0, Ordering::SeqCst);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    /// Closes the channel, dropping any wakeup not yet consumed. Returns
    /// whether the channel was open.
    pub fn close(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        self.pending.store(0, Ordering::SeqCst);
        was_open
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Number of wakeups posted and not yet consumed.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn parker(&self) -> &Parker {
        &self.parker
    }

    /// Posts one wakeup and resumes the owner.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the owner already closed it.
    pub fn wakeup(&self) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.parker.unpark();
        Ok(())
    }

    fn try_consume(&self) -> bool {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
            .is_ok()
    }

    /// Suspends the owner until a wakeup can be consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel is closed while
    /// nothing is pending.
    pub fn blocking_wait(&self) -> Result<(), ChannelError> {
        loop {
            if self.try_consume() {
                return Ok(());
            }
            if !self.is_open() {
                return Err(ChannelError::Closed);
            }
            self.parker.park();
        }
    }

    fn observe(&self) -> Option<PollEvent> {
        if self.pending() > 0 {
            Some(PollEvent::Ready)
        } else if !self.is_open() {
            Some(PollEvent::Hangup)
        } else {
            None
        }
    }
}

impl Pollable for WaiterChannel {
    fn poll_once(&self, timeout: Option<Duration>) -> Result<PollEvent, ChannelError> {
        if let Some(event) = self.observe() {
            return Ok(event);
        }

        match timeout {
            Some(timeout) if timeout.is_zero() => return Ok(PollEvent::Timeout),
            Some(timeout) => self.parker.park_timeout(timeout),
            None => self.parker.park(),
        }

        Ok(self.observe().unwrap_or(PollEvent::Interrupted))
    }
}
