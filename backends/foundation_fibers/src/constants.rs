// --- Constants

use core::time;

/// Guard value while no timed wait is confirming a delivery.
pub const GUARD_IDLE: u64 = 0;

/// Guard value while a timed wait owns delivery confirmation.
pub const GUARD_CLAIMED: u64 = 1;

/// DEFAULT_IDLE_SLICE bounds how long the ready-queue loop sleeps before
/// re-checking timers and incoming fibers on its own.
pub const DEFAULT_IDLE_SLICE: time::Duration = time::Duration::from_millis(100); // 100ms

/// Prefix for the names of the OS threads backing fibers.
pub const DEFAULT_FIBER_NAME: &str = "fiber";
