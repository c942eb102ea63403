#![cfg(test)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use foundation_fibers::fiber::Scheduler;
use foundation_fibers::synca::{EventInterlock, Interlock};
use foundation_fibers::{CondError, FiberCond};
use ntest::timeout;
use serial_test::serial;
use tracing_test::traced_test;

use super::common::{spawn_thread_timed_waiter, spawn_thread_waiter, wait_for_waiters};

/// WHY: a suspended waiter must come back once signalled, and a later signal
/// with nobody queued must be harmless
/// WHAT: thread waiter returns success; the extra signal succeeds with no effect
#[test]
#[timeout(5000)]
#[traced_test]
fn test_signal_wakes_waiter_then_empty_signal_is_noop() {
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());

    let waiter = spawn_thread_waiter(cond.clone(), lock.clone());
    wait_for_waiters(&cond, 1);

    assert_eq!(Ok(()), cond.signal());
    let outcome = waiter.join().expect("waiter should finish");
    assert_eq!(Ok(()), outcome.result);
    assert_eq!(0, outcome.live_handles);

    assert_eq!(0, cond.waiters());
    assert_eq!(Ok(()), cond.signal());
    assert_eq!(0, cond.waiters());
}

/// WHY: a bounded wait with nobody signalling must give up on time
/// WHAT: a plain thread times out after roughly 50ms with the handle released
#[test]
#[serial]
#[timeout(5000)]
fn test_timed_wait_without_signal_times_out() {
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());

    let outcome = spawn_thread_timed_waiter(cond.clone(), lock, Duration::from_millis(50))
        .join()
        .expect("waiter should finish");

    assert_eq!(Err(CondError::TimedOut), outcome.result);
    assert!(outcome.elapsed >= Duration::from_millis(50));
    assert!(
        outcome.elapsed < Duration::from_millis(1000),
        "took {:?}",
        outcome.elapsed
    );
    assert_eq!(0, outcome.live_handles);
    assert_eq!(0, cond.waiters());
}

/// WHY: a bounded wait must return as soon as it is signalled, not at its
/// deadline
/// WHAT: a 5s timed wait signalled after 10ms returns success well before 5s
#[test]
#[serial]
#[timeout(10000)]
fn test_timed_wait_returns_when_signalled_early() {
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());

    let waiter = spawn_thread_timed_waiter(cond.clone(), lock, Duration::from_secs(5));
    wait_for_waiters(&cond, 1);
    thread::sleep(Duration::from_millis(10));
    cond.signal().expect("should signal");

    let outcome = waiter.join().expect("waiter should finish");
    assert_eq!(Ok(()), outcome.result);
    assert!(
        outcome.elapsed < Duration::from_secs(1),
        "took {:?}",
        outcome.elapsed
    );
}

/// WHY: fiber waiters borrow their fiber's handle and must follow the same
/// wake protocol as threads
/// WHAT: a fiber waiter is woken by a sibling fiber; a later signal is a no-op
#[test]
#[timeout(10000)]
fn test_fiber_waiter_woken_by_fiber() {
    let scheduler = Scheduler::new();
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());
    let outcome = Arc::new(Mutex::new(None));

    let (cond_w, lock_w, outcome_w) = (cond.clone(), lock.clone(), outcome.clone());
    scheduler.spawn(move || {
        lock_w.wait().expect("take interlock");
        let result = cond_w.wait(&*lock_w);
        lock_w.notify().expect("release interlock");
        *outcome_w.lock().unwrap() = Some(result);
    });

    let cond_s = cond.clone();
    scheduler.spawn(move || {
        assert_eq!(1, cond_s.waiters());
        cond_s.signal().expect("should signal");
        assert_eq!(Ok(()), cond_s.signal());
    });

    scheduler.run().expect("should run");
    assert_eq!(Some(Ok(())), outcome.lock().unwrap().take());
    assert_eq!(0, cond.waiters());
}

/// WHY: a fiber in a bounded wait keeps the rest of its scheduler running and
/// still honours its deadline
/// WHAT: the timed-out fiber reports timeout after ~50ms while a sibling fiber
/// keeps making progress
#[test]
#[serial]
#[timeout(10000)]
fn test_fiber_timed_wait_times_out_while_siblings_run() {
    let scheduler = Scheduler::new();
    let cond = Arc::new(FiberCond::new());
    let outcome = Arc::new(Mutex::new(None));
    let ticks = Arc::new(Mutex::new(0_usize));

    let (cond_w, outcome_w) = (cond.clone(), outcome.clone());
    scheduler.spawn(move || {
        let lock = EventInterlock::held();
        let started = Instant::now();
        let result = cond_w.timed_wait(&lock, Duration::from_millis(50));
        *outcome_w.lock().unwrap() = Some((result, started.elapsed()));
    });

    let ticks_s = ticks.clone();
    scheduler.spawn(move || {
        for _ in 0..5 {
            *ticks_s.lock().unwrap() += 1;
            foundation_fibers::fiber::yield_now();
        }
    });

    scheduler.run().expect("should run");

    let (result, elapsed) = outcome.lock().unwrap().take().expect("fiber ran");
    assert_eq!(Err(CondError::TimedOut), result);
    assert!(elapsed >= Duration::from_millis(50));
    assert_eq!(5, *ticks.lock().unwrap());
}

/// WHY: plain threads must be able to signal fibers parked inside a scheduler
/// WHAT: a 5s fiber timed wait signalled from a thread after 10ms succeeds early
#[test]
#[serial]
#[timeout(10000)]
fn test_fiber_timed_wait_signalled_from_thread() {
    let scheduler = Scheduler::new();
    let cond = Arc::new(FiberCond::new());
    let outcome = Arc::new(Mutex::new(None));

    let (cond_w, outcome_w) = (cond.clone(), outcome.clone());
    scheduler.spawn(move || {
        let lock = EventInterlock::held();
        let started = Instant::now();
        let result = cond_w.timed_wait(&lock, Duration::from_secs(5));
        *outcome_w.lock().unwrap() = Some((result, started.elapsed()));
    });

    let cond_s = cond.clone();
    let signaler = thread::spawn(move || {
        wait_for_waiters(&cond_s, 1);
        thread::sleep(Duration::from_millis(10));
        cond_s.signal().expect("should signal");
    });

    scheduler.run().expect("should run");
    signaler.join().expect("signaler should finish");

    let (result, elapsed) = outcome.lock().unwrap().take().expect("fiber ran");
    assert_eq!(Ok(()), result);
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
}

/// WHY: a fiber signaller must be able to wake a blocked plain thread
/// WHAT: a thread waiter returns success after a fiber signals it
#[test]
#[timeout(10000)]
fn test_thread_waiter_woken_by_fiber() {
    let cond = Arc::new(FiberCond::new());
    let lock = Arc::new(EventInterlock::new());

    let waiter = spawn_thread_waiter(cond.clone(), lock.clone());
    wait_for_waiters(&cond, 1);

    let scheduler = Scheduler::new();
    let cond_s = cond.clone();
    scheduler.spawn(move || cond_s.signal().expect("should signal"));
    scheduler.run().expect("should run");

    let outcome = waiter.join().expect("waiter should finish");
    assert_eq!(Ok(()), outcome.result);
    assert_eq!(0, outcome.live_handles);
}
