use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::{GUARD_CLAIMED, GUARD_IDLE};
use crate::errors::{fatal, ProtocolViolation};

/// `ClaimGuard` is the single-claim token that decides which path owns
/// the resolution of an in-flight timed wait.
///
/// The guard moves `GUARD_IDLE -> GUARD_CLAIMED` through [`Self::claim`] and
/// back through [`Self::release`]. Any other transition means the
/// condition variable's bookkeeping is corrupt.
#[derive(Debug)]
pub struct ClaimGuard {
    state: AtomicU64,
}

impl Default for ClaimGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(GUARD_IDLE),
        }
    }

    /// `claim` flips the guard from idle to claimed, returning false when
    /// some other path already holds it.
    #[inline]
    pub fn claim(&self) -> bool {
        self.state
            .compare_exchange(GUARD_IDLE, GUARD_CLAIMED, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// `release` flips the guard back to idle.
    ///
    /// # Panics
    ///
    /// Raises [`ProtocolViolation::GuardCorrupt`] if the guard was not claimed.
    #[inline]
    pub fn release(&self) {
        if let Err(found) = self.state.compare_exchange(
            GUARD_CLAIMED,
            GUARD_IDLE,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            fatal(ProtocolViolation::GuardCorrupt { found });
        }
    }

    /// probe returns true while the guard is claimed.
    #[inline]
    pub fn probe(&self) -> bool {
        self.state.load(Ordering::Acquire) == GUARD_CLAIMED
    }
}
