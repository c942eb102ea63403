use derive_more::From;

use crate::fiber::FiberId;

/// Failures reported by an [`crate::synca::Interlock`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterlockError {
    /// `notify` was called on an interlock nobody holds.
    #[error("interlock released while not held")]
    NotHeld,

    /// The interlock's internal lock was poisoned by a panicking holder.
    #[error("interlock state poisoned")]
    Poisoned,
}

/// Failures of a waiter's suspend/wakeup channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel was already closed when it was used.
    #[error("waiter channel is closed")]
    Closed,

    /// The channel was opened twice without a close in between.
    #[error("waiter channel is already open")]
    AlreadyOpen,
}

/// Result of [`crate::FiberCond`] operations that can fail without
/// corrupting shared state.
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum CondError {
    /// The bounded wait expired before any signal was delivered.
    #[from(ignore)]
    TimedOut,

    /// The caller supplied interlock refused a notify or wait.
    Interlock(InterlockError),

    /// The waiter channel failed during wakeup or delivery.
    Channel(ChannelError),
}

impl CondError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CondError::TimedOut)
    }
}

impl std::error::Error for CondError {}

impl core::fmt::Display for CondError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CondError::TimedOut => write!(f, "CondError::TimedOut"),
            CondError::Interlock(err) => write!(f, "CondError::Interlock({err})"),
            CondError::Channel(err) => write!(f, "CondError::Channel({err})"),
        }
    }
}

pub type CondResult<T> = Result<T, CondError>;

#[derive(Debug, From)]
pub enum SchedulerError {
    /// `run` was called from inside one of the scheduler's fibers.
    #[from(ignore)]
    NestedRun,

    /// A fiber's body panicked; the scheduler still ran every other fiber.
    #[from(ignore)]
    FiberPanicked(FiberId),

    /// The OS refused to create the thread backing a fiber.
    SpawnFailed(std::io::Error),
}

impl std::error::Error for SchedulerError {}

impl core::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Internal consistency breaches. These are never returned; they are raised
/// through [`fatal`] because the state they describe can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("cond corrupt: timed-wait guard held {found} when releasing a claim")]
    GuardCorrupt { found: u64 },

    #[error("waiter handle is already registered on a wait queue")]
    AlreadyQueued,

    #[error("internal lock of {0} is poisoned")]
    LockPoisoned(&'static str),
}

/// Reports `violation` and unwinds. There is no safe continuation once a
/// condition variable's bookkeeping disagrees with itself.
#[track_caller]
pub fn fatal(violation: ProtocolViolation) -> ! {
    let location = core::panic::Location::caller();
    tracing::error!("{}({}): fatal: {}", location.file(), location.line(), violation);
    panic!("{violation}");
}
