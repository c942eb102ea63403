//! Stress test framework for fiber-aware synchronization primitives.
//!
//! Provides configurable high-contention testing with:
//! - Worker count control, on OS threads or scheduler fibers
//! - Iteration limits
//! - Time-based duration
//! - Success rate tracking

use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use foundation_fibers::fiber::{Scheduler, SchedulerConfig};

pub mod config;
pub mod sync;

pub use config::{StressConfig, DEFAULT_SEED};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Total operations completed successfully
    pub successes: usize,
    /// Total operations that failed
    pub failures: usize,
    /// Total time taken for the test
    pub duration: Duration,
    /// Number of workers used
    pub thread_count: usize,
}

impl StressResult {
    /// Creates a new stress test result.
    #[must_use]
    pub const fn new(
        successes: usize,
        failures: usize,
        duration: Duration,
        thread_count: usize,
    ) -> Self {
        Self {
            successes,
            failures,
            duration,
            thread_count,
        }
    }

    /// Returns the total number of operations.
    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.successes + self.failures
    }

    /// Returns the success rate as a value between 0.0 and 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_operations() == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_operations() as f64
        }
    }

    /// Returns operations per second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn operations_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.total_operations() as f64 / secs
        }
    }
}

struct Tally {
    successes: AtomicUsize,
    failures: AtomicUsize,
    stop: AtomicBool,
}

impl Tally {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            successes: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
        })
    }

    fn work<F>(&self, operation: &F, worker: usize, iterations: usize)
    where
        F: Fn(usize, usize) -> bool,
    {
        for iteration in 0..iterations {
            if self.stop.load(Ordering::Acquire) {
                break;
            }

            if operation(worker, iteration) {
                self.successes.fetch_add(1, Ordering::Relaxed);
            } else {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn result(&self, started: Instant, workers: usize) -> StressResult {
        StressResult::new(
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            started.elapsed(),
            workers,
        )
    }
}

/// Base stress test harness.
///
/// Runs a closure repeatedly on several workers until every worker finished
/// its iterations or the configured duration passed.
pub struct StressHarness {
    config: StressConfig,
}

impl StressHarness {
    /// Creates a new stress test harness with the given configuration.
    #[must_use]
    pub const fn new(config: StressConfig) -> Self {
        Self { config }
    }

    /// Returns the harness configuration.
    #[must_use]
    pub const fn config(&self) -> &StressConfig {
        &self.config
    }

    fn arm_deadline(&self, tally: &Arc<Tally>) {
        if let Some(duration) = self.config.get_duration() {
            let tally = Arc::clone(tally);
            thread::spawn(move || {
                thread::sleep(duration);
                tally.stop.store(true, Ordering::Release);
            });
        }
    }

    /// Runs a stress test with the given operation closure, one OS thread
    /// per worker.
    ///
    /// The closure receives:
    /// - `worker`: Index of the worker (`0..thread_count`)
    /// - `iteration`: Iteration number for this worker
    ///
    /// Returns `true` on success, `false` on failure.
    ///
    /// # Panics
    ///
    /// Panics if any worker thread panics during the stress test execution.
    pub fn run<F>(self, operation: F) -> StressResult
    where
        F: Fn(usize, usize) -> bool + Send + Sync + 'static,
    {
        let started = Instant::now();
        let operation = Arc::new(operation);
        let tally = Tally::new();
        self.arm_deadline(&tally);

        let workers = self.config.get_thread_count();
        let iterations = self.config.get_iterations();

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let operation = Arc::clone(&operation);
                let tally = Arc::clone(&tally);
                thread::spawn(move || tally.work(&*operation, worker, iterations))
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked during stress test");
        }

        tally.result(started, workers)
    }

    /// Runs a stress test with one fiber per worker, all driven by a single
    /// [`Scheduler`] on the calling thread.
    ///
    /// Operations that block on fiber-aware primitives hand the scheduler to
    /// the next ready worker instead of stalling the run.
    ///
    /// # Panics
    ///
    /// Panics if any fiber panics or the scheduler cannot launch a worker.
    pub fn run_fibers<F>(self, operation: F) -> StressResult
    where
        F: Fn(usize, usize) -> bool + Send + Sync + 'static,
    {
        let started = Instant::now();
        let operation = Arc::new(operation);
        let tally = Tally::new();
        self.arm_deadline(&tally);

        let workers = self.config.get_thread_count();
        let iterations = self.config.get_iterations();

        let scheduler = Scheduler::with_config(SchedulerConfig::new().name("stress"));
        for worker in 0..workers {
            let operation = Arc::clone(&operation);
            let tally = Arc::clone(&tally);
            scheduler.spawn(move || tally.work(&*operation, worker, iterations));
        }

        scheduler
            .run()
            .expect("Fiber panicked during stress test");

        tally.result(started, workers)
    }
}
