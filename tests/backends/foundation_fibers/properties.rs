#![cfg(test)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use foundation_fibers::fiber::{self, Scheduler};
use foundation_fibers::synca::{EventInterlock, Interlock};
use foundation_fibers::waiter::live_synthetic_handles;
use foundation_fibers::{CondError, FiberCond};
use foundation_testing::stress::sync::{run_cond_timeout_race_stress, run_cond_unique_wake_stress};
use foundation_testing::stress::StressConfig;
use ntest::timeout;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serial_test::serial;
use tracing_test::traced_test;

use super::common::{spawn_thread_timed_waiter, spawn_thread_waiter, wait_for_waiters};

/// WHY: waiters must be served in the order they registered
/// WHAT: eight thread waiters are woken 0..8 by eight successive signals
#[test]
#[timeout(10000)]
fn test_thread_waiters_woken_in_registration_order() {
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());
    let woken = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for index in 0..8 {
        let (thread_cond, lock, woken) = (cond.clone(), lock.clone(), woken.clone());
        handles.push(thread::spawn(move || {
            lock.wait().expect("take interlock");
            thread_cond.wait(&*lock).expect("should be woken");
            woken.lock().unwrap().push(index);
            lock.notify().expect("release interlock");
        }));
        wait_for_waiters(&cond, index + 1);
    }

    for expected in 1..=8 {
        cond.signal().expect("should signal");
        while woken.lock().unwrap().len() < expected {
            thread::sleep(Duration::from_millis(1));
        }
    }

    for handle in handles {
        handle.join().expect("waiter should finish");
    }
    assert_eq!((0..8).collect::<Vec<_>>(), *woken.lock().unwrap());
}

/// WHY: fibers register in the order they run and must be woken in that order
/// WHAT: a signaller fiber issuing eight signals wakes waiter fibers 0..8 in order
#[test]
#[timeout(10000)]
fn test_fiber_waiters_woken_in_registration_order() {
    let scheduler = Scheduler::new();
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());
    let woken = Arc::new(Mutex::new(Vec::new()));

    for index in 0..8 {
        let (cond, lock, woken) = (cond.clone(), lock.clone(), woken.clone());
        scheduler.spawn(move || {
            lock.wait().expect("take interlock");
            cond.wait(&*lock).expect("should be woken");
            woken.lock().unwrap().push(index);
            lock.notify().expect("release interlock");
        });
    }

    let cond_s = cond.clone();
    scheduler.spawn(move || {
        assert_eq!(8, cond_s.waiters());
        for _ in 0..8 {
            cond_s.signal().expect("should signal");
        }
    });

    scheduler.run().expect("should run");
    assert_eq!((0..8).collect::<Vec<_>>(), *woken.lock().unwrap());
}

/// WHY: concurrent signals must each claim a distinct waiter
/// WHAT: four simultaneous signals wake each of four waiters exactly once
#[test]
#[timeout(10000)]
#[traced_test]
fn test_concurrent_signals_wake_distinct_waiters() {
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());

    let waiters: Vec<_> = (0..4)
        .map(|_| spawn_thread_waiter(cond.clone(), lock.clone()))
        .collect();
    wait_for_waiters(&cond, 4);

    let start = Arc::new(Barrier::new(4));
    let signalers: Vec<_> = (0..4)
        .map(|_| {
            let (cond, start) = (cond.clone(), start.clone());
            thread::spawn(move || {
                start.wait();
                cond.signal().expect("should signal");
            })
        })
        .collect();

    for signaler in signalers {
        signaler.join().expect("signaler should finish");
    }
    for waiter in waiters {
        assert_eq!(Ok(()), waiter.join().expect("waiter should finish").result);
    }
    assert_eq!(0, cond.waiters());
}

/// WHY: a single signal must never release more than one waiter
/// WHAT: with three waiters queued one signal wakes exactly one of them
#[test]
#[timeout(10000)]
fn test_one_signal_wakes_one_waiter() {
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());
    let woken = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let (cond, lock, woken) = (cond.clone(), lock.clone(), woken.clone());
            thread::spawn(move || {
                lock.wait().expect("take interlock");
                cond.wait(&*lock).expect("should be woken");
                woken.fetch_add(1, Ordering::SeqCst);
                lock.notify().expect("release interlock");
            })
        })
        .collect();
    wait_for_waiters(&cond, 3);

    cond.signal().expect("should signal");
    while woken.load(Ordering::SeqCst) < 1 {
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(50));
    assert_eq!(1, woken.load(Ordering::SeqCst));
    assert_eq!(2, cond.waiters());

    assert_eq!(Ok(2), cond.signal_all());
    for handle in handles {
        handle.join().expect("waiter should finish");
    }
    assert_eq!(3, woken.load(Ordering::SeqCst));
}

/// WHY: wakeup accounting must hold under sustained contention
/// WHAT: the unique-wake stress run never sees more wakeups than signals
#[test]
#[timeout(60000)]
fn test_unique_wake_under_contention() {
    let report = run_cond_unique_wake_stress(StressConfig::new().threads(8).iterations(250));

    assert_eq!(0, report.result.failures);
    assert_eq!(1000, report.signals);
    assert!(report.is_unique(), "{report:?}");
}

/// WHY: signalling an empty condition variable must not fail or leave state
/// WHAT: signal and `signal_all` on an empty queue succeed and wake nobody
#[test]
fn test_empty_signal_is_noop() {
    let cond = FiberCond::new();
    for _ in 0..3 {
        assert_eq!(Ok(()), cond.signal());
    }
    assert_eq!(Ok(0), cond.signal_all());
    assert_eq!(0, cond.waiters());

    // a later waiter must not see the earlier signals
    let lock = EventInterlock::held();
    assert_eq!(
        Err(CondError::TimedOut),
        cond.timed_wait(&lock, Duration::from_millis(10))
    );
    cond.free();
}

/// WHY: an expired wait must take at least its timeout and leave nothing behind
/// WHAT: timeouts of several lengths each expire on time with the queue empty
#[test]
#[serial]
#[timeout(10000)]
fn test_timeout_fairness() {
    let cond = FiberCond::new();
    let lock = EventInterlock::held();

    for millis in [1_u64, 10, 30] {
        let timeout = Duration::from_millis(millis);
        let started = Instant::now();
        assert_eq!(Err(CondError::TimedOut), cond.timed_wait(&lock, timeout));
        assert!(started.elapsed() >= timeout);
        assert_eq!(0, cond.waiters());
        assert_eq!(0, live_synthetic_handles());
    }
}

/// WHY: a zero timeout is a valid request that must resolve immediately
/// WHAT: `timed_wait` with a zero duration times out and unregisters
#[test]
fn test_zero_timeout_expires_immediately() {
    let cond = FiberCond::new();
    let lock = EventInterlock::held();

    assert_eq!(Err(CondError::TimedOut), cond.timed_wait(&lock, Duration::ZERO));
    assert_eq!(0, cond.waiters());
    assert_eq!(Ok(false), lock.try_wait());
}

/// WHY: a signal racing a timeout must resolve the wait exactly once and
/// never be lost
/// WHAT: over seeded random interleavings, success happens exactly when the
/// signal found the waiter queued, timeout exactly when it found nobody
#[test]
#[serial]
#[timeout(60000)]
fn test_signal_timeout_race_is_consistent() {
    for seed in 0..64_u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let timeout = Duration::from_micros(rng.random_range(50..=500));
        let delay = Duration::from_micros(rng.random_range(0..=600));

        let cond = Arc::new(FiberCond::new());
        let lock = Arc::new(EventInterlock::new());
        let waiter = spawn_thread_timed_waiter(cond.clone(), lock, timeout);

        thread::sleep(delay);
        let woken = cond.signal_all().expect("should signal");
        let outcome = waiter.join().expect("waiter should finish");

        match (woken, outcome.result) {
            (1, Ok(())) | (0, Err(CondError::TimedOut)) => {}
            (woken, result) => panic!("seed {seed}: woke {woken}, wait returned {result:?}"),
        }
        assert_eq!(0, cond.waiters(), "seed {seed}");
        assert_eq!(0, outcome.live_handles, "seed {seed}");
    }
}

/// WHY: the race must also stay consistent when many races run at once
/// WHAT: the timeout race stress run reports no inconsistent resolution
#[test]
#[serial]
#[timeout(60000)]
fn test_signal_timeout_race_under_contention() {
    let config = StressConfig::new()
        .threads(4)
        .iterations(100)
        .seed(0xC0FFEE)
        .max_jitter(Duration::from_micros(400));
    let report = run_cond_timeout_race_stress(config);

    assert_eq!(0, report.result.failures);
    assert_eq!(400, report.delivered + report.expired);
}

/// WHY: fiber handles are reused by every wait of a fiber, so each wait must
/// leave the handle closed and off the queue
/// WHAT: after success, timeout and misuse the fiber's handle is idle again
#[test]
#[serial]
#[timeout(10000)]
fn test_fiber_handle_is_idle_after_every_path() {
    let scheduler = Scheduler::new();
    let cond = Arc::new(FiberCond::new());
    let states = Arc::new(Mutex::new(Vec::new()));
    let untimed = Arc::new(AtomicBool::new(false));

    let (cond_w, states_w, untimed_w) = (cond.clone(), states.clone(), untimed.clone());
    scheduler.spawn(move || {
        let handle = fiber::current_handle().expect("inside fiber");
        let idle = || !handle.channel().is_open() && !handle.is_queued();

        let lock = EventInterlock::held();
        let timed_out = cond_w.timed_wait(&lock, Duration::from_millis(5));
        states_w.lock().unwrap().push((timed_out.is_err(), idle()));

        untimed_w.store(true, Ordering::SeqCst);
        let signalled = cond_w.wait(&lock);
        states_w.lock().unwrap().push((signalled.is_ok(), idle()));

        lock.notify().expect("release interlock");
        let misuse = cond_w.wait(&lock);
        states_w.lock().unwrap().push((misuse.is_err(), idle()));
    });

    let cond_s = cond.clone();
    scheduler.spawn(move || {
        while !untimed.load(Ordering::SeqCst) || cond_s.waiters() == 0 {
            fiber::yield_now();
        }
        cond_s.signal().expect("should signal");
    });

    scheduler.run().expect("should run");
    assert_eq!(
        vec![(true, true), (true, true), (true, true)],
        *states.lock().unwrap()
    );
    assert_eq!(0, live_synthetic_handles());
}

/// WHY: threads allocate a handle per wait and must release it on every path
/// WHAT: the thread's synthetic handle count returns to zero after success,
/// timeout and misuse
#[test]
#[timeout(10000)]
fn test_thread_handles_released_after_every_path() {
    let cond = Arc::new(FiberCond::new());

    let cond_w = cond.clone();
    let counts = thread::spawn(move || {
        let lock = EventInterlock::held();
        let mut counts = Vec::new();

        let _ = cond_w.timed_wait(&lock, Duration::from_millis(5));
        counts.push(live_synthetic_handles());

        lock.notify().expect("release interlock");
        let _ = cond_w.wait(&lock);
        counts.push(live_synthetic_handles());

        counts
    })
    .join()
    .expect("waiter should finish");

    assert_eq!(vec![0, 0], counts);
    assert_eq!(0, cond.waiters());
}
