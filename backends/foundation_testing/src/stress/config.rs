//! Stress test configuration.

use core::time::Duration;

/// Seed used when a run does not pick its own.
pub const DEFAULT_SEED: u64 = 0x5EED_F1BE;

/// Configuration for stress tests.
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    /// Number of workers (threads or fibers) to spawn
    thread_count: usize,
    /// Number of iterations per worker
    iterations: usize,
    /// Optional maximum duration for the test
    duration: Option<Duration>,
    /// Seed for randomized delays, offset per worker
    seed: u64,
    /// Upper bound of the randomized delays injected by race runs
    max_jitter: Duration,
}

impl StressConfig {
    /// Creates a new stress test configuration with default values.
    ///
    /// Defaults:
    /// - `thread_count`: 4
    /// - `iterations`: 1000
    /// - `duration`: None (no time limit)
    /// - `seed`: [`DEFAULT_SEED`]
    /// - `max_jitter`: 200µs
    #[must_use]
    pub const fn new() -> Self {
        Self {
            thread_count: 4,
            iterations: 1000,
            duration: None,
            seed: DEFAULT_SEED,
            max_jitter: Duration::from_micros(200),
        }
    }

    /// Sets the number of workers to spawn.
    #[must_use]
    pub const fn threads(mut self, count: usize) -> Self {
        self.thread_count = count;
        self
    }

    /// Sets the number of iterations per worker.
    #[must_use]
    pub const fn iterations(mut self, count: usize) -> Self {
        self.iterations = count;
        self
    }

    /// Sets the maximum duration for the test.
    ///
    /// If the duration is reached, workers stop early.
    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Sets the seed randomized runs derive their generators from.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the largest delay a race run injects between its parties.
    #[must_use]
    pub const fn max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Returns the worker count.
    #[must_use]
    pub const fn get_thread_count(&self) -> usize {
        self.thread_count
    }

    /// Returns the iteration count.
    #[must_use]
    pub const fn get_iterations(&self) -> usize {
        self.iterations
    }

    /// Returns the optional duration.
    #[must_use]
    pub const fn get_duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns the base seed.
    #[must_use]
    pub const fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Returns the jitter bound.
    #[must_use]
    pub const fn get_max_jitter(&self) -> Duration {
        self.max_jitter
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self::new()
    }
}
