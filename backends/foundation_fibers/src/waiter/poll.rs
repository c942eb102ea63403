//! Readiness polling over a waiter's channel.

use std::time::{Duration, Instant};

use crate::errors::ChannelError;

/// What a single poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A wakeup is pending.
    Ready,

    /// The source was closed under the poller.
    Hangup,

    /// Nothing arrived within the timeout.
    Timeout,

    /// The poller was resumed early; poll again with the remaining time.
    Interrupted,
}

/// Outcome of [`wait_readable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    Failed(ChannelError),
}

/// A readiness source that can be polled with a timeout.
pub trait Pollable {
    /// Polls once. `None` waits without a bound; a zero timeout only checks.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the source cannot be polled at all.
    fn poll_once(&self, timeout: Option<Duration>) -> Result<PollEvent, ChannelError>;
}

/// Polls `source` until it reports readiness or `deadline` passes.
///
/// Interrupted polls are retried with whatever time remains; a hangup is
/// reported as readiness so the caller's confirmation step observes the
/// failure itself.
pub fn wait_readable<P: Pollable + ?Sized>(source: &P, deadline: Option<Instant>) -> Readiness {
    loop {
        let timeout = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match source.poll_once(timeout) {
            Ok(PollEvent::Ready | PollEvent::Hangup) => return Readiness::Ready,
            Ok(PollEvent::Timeout) => return Readiness::TimedOut,
            Ok(PollEvent::Interrupted) => continue,
            Err(err) => return Readiness::Failed(err),
        }
    }
}
