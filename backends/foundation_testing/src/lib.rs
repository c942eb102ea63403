//! Reusable stress testing infrastructure for `foundation_fibers`.
//!
//! This crate provides:
//! - **Stress test framework**: configurable high-contention runs on OS
//!   threads or on the fibers of a [`foundation_fibers::fiber::Scheduler`]
//! - **Condition variable stress runs**: unique wakeup accounting and
//!   signal-versus-timeout races
//! - **Common scenarios**: a bounded producer-consumer queue
//!
//! # Examples
//!
//! ```rust
//! use foundation_testing::stress::{StressConfig, StressHarness};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let config = StressConfig::new()
//!     .threads(4)
//!     .iterations(100);
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! let harness = StressHarness::new(config);
//!
//! let counter_clone = Arc::clone(&counter);
//! let results = harness.run(move |_thread_id, _iteration| {
//!     counter_clone.fetch_add(1, Ordering::Relaxed);
//!     true
//! });
//!
//! assert_eq!(results.successes, 400); // 4 threads * 100 iterations
//! assert!(results.success_rate() > 0.99);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Common for testing crates

pub mod scenarios;
pub mod stress;


// Re-export commonly used items
pub use stress::{StressConfig, StressHarness, StressResult};
