//! Condition variables that fibers and plain threads can wait on together.
//!
//! [`FiberCond`] suspends only the calling fiber when used from inside a
//! [`fiber::Scheduler`], letting the scheduler keep running its other
//! fibers, and blocks the OS thread otherwise. The caller's mutual exclusion
//! is abstracted behind [`synca::Interlock`].

pub mod constants;
pub mod errors;
pub mod fiber;
pub mod synca;
pub mod waiter;

mod cond;

pub use cond::*;
pub use errors::{ChannelError, CondError, CondResult, InterlockError, SchedulerError};
