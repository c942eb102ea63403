//! Scheduler configuration.

use core::time::Duration;

use crate::constants::{DEFAULT_FIBER_NAME, DEFAULT_IDLE_SLICE};

/// Configuration for a [`super::Scheduler`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Prefix of the OS thread name backing each fiber.
    name: &'static str,
    /// Optional stack size for the OS threads backing fibers.
    stack_size: Option<usize>,
    /// Longest stretch the ready-queue loop sleeps without re-checking timers.
    idle_slice: Duration,
}

impl SchedulerConfig {
    /// Creates a new scheduler configuration with default values.
    ///
    /// Defaults:
    /// - `name`: `"fiber"`
    /// - `stack_size`: None (platform default)
    /// - `idle_slice`: 100ms
    #[must_use]
    pub const fn new() -> Self {
        Self {
            name: DEFAULT_FIBER_NAME,
            stack_size: None,
            idle_slice: DEFAULT_IDLE_SLICE,
        }
    }

    /// Sets the thread name prefix for fibers.
    #[must_use]
    pub const fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sets the stack size of the threads backing fibers.
    #[must_use]
    pub const fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Sets the idle slice of the ready-queue loop.
    ///
    /// A zero slice is bumped to one millisecond so the loop never spins.
    #[must_use]
    pub const fn idle_slice(mut self, slice: Duration) -> Self {
        self.idle_slice = if slice.is_zero() {
            Duration::from_millis(1)
        } else {
            slice
        };
        self
    }

    #[must_use]
    pub const fn get_name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn get_stack_size(&self) -> Option<usize> {
        self.stack_size
    }

    #[must_use]
    pub const fn get_idle_slice(&self) -> Duration {
        self.idle_slice
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
