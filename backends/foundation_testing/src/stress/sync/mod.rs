//! Stress tests for fiber-aware synchronization primitives.

pub mod cond;

pub use cond::{
    run_cond_timeout_race_stress, run_cond_unique_wake_stress, run_fiber_cond_unique_wake_stress,
    RaceReport, WakeupReport,
};
