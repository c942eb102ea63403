//! `FiberCond` stress tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use foundation_fibers::synca::{EventInterlock, Interlock};
use foundation_fibers::waiter::live_synthetic_handles;
use foundation_fibers::{CondError, FiberCond};
use derive_more::Display;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::stress::{StressConfig, StressHarness, StressResult};

/// Wakeup accounting of a unique-wake run.
#[derive(Debug, Display, Clone)]
#[display("signals={signals} wakeups={wakeups} leaked={leaked_waiters}")]
pub struct WakeupReport {
    /// Per-operation outcome of the run
    pub result: StressResult,
    /// Signals issued by the signaling workers
    pub signals: usize,
    /// Waits that returned successfully
    pub wakeups: usize,
    /// Waiters still registered once every worker finished
    pub leaked_waiters: usize,
}

impl WakeupReport {
    /// True when no wait returned without a signal of its own.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.wakeups <= self.signals && self.leaked_waiters == 0
    }
}

/// Outcome counts of a signal-versus-timeout race run.
#[derive(Debug, Display, Clone)]
#[display("delivered={delivered} expired={expired}")]
pub struct RaceReport {
    /// Per-operation outcome of the run; a failure is an inconsistent race
    pub result: StressResult,
    /// Races the signal won
    pub delivered: usize,
    /// Races the timeout won
    pub expired: usize,
}

/// Token pool shared by waiting and signaling workers. `tokens` is only
/// changed while `lock` is held.
struct TokenPool {
    cond: FiberCond,
    lock: EventInterlock,
    tokens: AtomicUsize,
    signals: AtomicUsize,
    wakeups: AtomicUsize,
}

impl TokenPool {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cond: FiberCond::new(),
            lock: EventInterlock::new(),
            tokens: AtomicUsize::new(0),
            signals: AtomicUsize::new(0),
            wakeups: AtomicUsize::new(0),
        })
    }

    fn take(&self) -> bool {
        if let Err(err) = self.lock.wait() {
            tracing::error!("Failed to take interlock: {}", err);
            return false;
        }

        while self.tokens.load(Ordering::SeqCst) == 0 {
            match self.cond.wait(&self.lock) {
                Ok(()) => {
                    self.wakeups.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    tracing::error!("Waiter failed: {}", err);
                    let _ = self.lock.notify();
                    return false;
                }
            }
        }

        self.tokens.fetch_sub(1, Ordering::SeqCst);
        self.lock.notify().is_ok()
    }

    fn give(&self) -> bool {
        if let Err(err) = self.lock.wait() {
            tracing::error!("Failed to take interlock: {}", err);
            return false;
        }
        self.tokens.fetch_add(1, Ordering::SeqCst);
        if self.lock.notify().is_err() {
            return false;
        }

        self.signals.fetch_add(1, Ordering::SeqCst);
        self.cond.signal().is_ok()
    }

    fn operation(self: &Arc<Self>) -> impl Fn(usize, usize) -> bool + Send + Sync + 'static {
        let pool = Arc::clone(self);
        move |worker, _iteration| {
            if worker % 2 == 0 {
                pool.take()
            } else {
                pool.give()
            }
        }
    }

    fn report(&self, result: StressResult) -> WakeupReport {
        let report = WakeupReport {
            result,
            signals: self.signals.load(Ordering::SeqCst),
            wakeups: self.wakeups.load(Ordering::SeqCst),
            leaked_waiters: self.cond.waiters(),
        };
        tracing::info!("Unique-wake run finished: {}", report);
        report
    }
}

fn check_balanced(config: &StressConfig) {
    assert!(
        config.get_thread_count() % 2 == 0,
        "unique wake runs pair each waiter with a signaler"
    );
    assert!(
        config.get_duration().is_none(),
        "unique wake runs must finish every iteration"
    );
}

/// Runs waiters and signalers on OS threads against one `FiberCond`.
///
/// Even workers take a token, waiting while none is available, odd workers
/// add a token and signal once. A wait only returns successfully when a
/// signal dequeued it, so the report must show no more wakeups than signals.
///
/// # Examples
///
/// ```
/// use foundation_testing::stress::{StressConfig, sync::run_cond_unique_wake_stress};
///
/// let config = StressConfig::new().threads(4).iterations(100);
/// let report = run_cond_unique_wake_stress(config);
///
/// assert!(report.is_unique());
/// assert_eq!(report.result.failures, 0);
/// ```
///
/// # Panics
///
/// Panics if the worker count is odd or a duration is configured, since
/// either leaves waiters without a matching signal.
#[must_use]
pub fn run_cond_unique_wake_stress(config: StressConfig) -> WakeupReport {
    check_balanced(&config);
    let pool = TokenPool::new();
    let result = StressHarness::new(config).run(pool.operation());
    pool.report(result)
}

/// Fiber counterpart of [`run_cond_unique_wake_stress`]: every worker is a
/// fiber of one scheduler, so waiters suspend through the scheduler while
/// signalers keep running.
///
/// # Panics
///
/// Same conditions as [`run_cond_unique_wake_stress`].
#[must_use]
pub fn run_fiber_cond_unique_wake_stress(config: StressConfig) -> WakeupReport {
    check_balanced(&config);
    let pool = TokenPool::new();
    let result = StressHarness::new(config).run_fibers(pool.operation());
    pool.report(result)
}

fn jitter_micros(config: &StressConfig) -> u64 {
    u64::try_from(config.get_max_jitter().as_micros())
        .unwrap_or(u64::MAX)
        .max(1)
}

/// Races a timed wait against a signal from another thread, each party
/// delayed by a seeded random amount.
///
/// An iteration succeeds when its resolution is consistent: the wait returned
/// success exactly when the signal woke a waiter, and timed out exactly when
/// the signal found nobody. It also requires that nothing stays registered
/// and that the waiting thread holds no synthetic handle afterwards.
#[must_use]
pub fn run_cond_timeout_race_stress(config: StressConfig) -> RaceReport {
    let delivered = Arc::new(AtomicUsize::new(0));
    let expired = Arc::new(AtomicUsize::new(0));
    let seed = config.get_seed();
    let jitter = jitter_micros(&config);

    let delivered_clone = Arc::clone(&delivered);
    let expired_clone = Arc::clone(&expired);
    let result = StressHarness::new(config).run(move |worker, iteration| {
        let stream = ((worker as u64) << 32) | iteration as u64;
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ stream);
        let timeout = Duration::from_micros(rng.random_range(1..=jitter));
        let delay = Duration::from_micros(rng.random_range(0..=jitter));

        let cond = Arc::new(FiberCond::new());
        let lock = EventInterlock::held();

        let signaler_cond = Arc::clone(&cond);
        let signaler = thread::spawn(move || {
            thread::sleep(delay);
            signaler_cond.signal_all()
        });

        let outcome = cond.timed_wait(&lock, timeout);
        let Ok(woken) = signaler.join() else {
            return false;
        };
        let released = lock.notify().is_ok();

        let consistent = match (outcome, woken) {
            (Ok(()), Ok(1)) => {
                delivered_clone.fetch_add(1, Ordering::Relaxed);
                true
            }
            (Err(CondError::TimedOut), Ok(0)) => {
                expired_clone.fetch_add(1, Ordering::Relaxed);
                true
            }
            (outcome, woken) => {
                tracing::error!(
                    "Inconsistent race at worker {} iteration {}: wait={:?} signal={:?}",
                    worker,
                    iteration,
                    outcome,
                    woken
                );
                false
            }
        };

        consistent && released && cond.waiters() == 0 && live_synthetic_handles() == 0
    });

    let report = RaceReport {
        result,
        delivered: delivered.load(Ordering::Relaxed),
        expired: expired.load(Ordering::Relaxed),
    };
    tracing::info!("Timeout race run finished: {}", report);
    report
}
