// Implements a cooperative ready-queue loop where every fiber is backed
// by its own OS thread but only the fiber holding the baton runs.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use concurrent_queue::ConcurrentQueue;

use crate::errors::{fatal, ProtocolViolation, SchedulerError};
use crate::synca::RunOnDrop;

use super::{install_context, FiberId, FiberRef, SchedulerConfig};

/// Why a parked fiber got its baton back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Someone called unpark, or a permit was already waiting.
    Unparked,

    /// The park deadline passed first.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FiberStatus {
    Ready,
    Running,
    Parked { deadline: Option<Instant> },
}

#[derive(Debug)]
struct FiberEntry {
    status: FiberStatus,
    permit: bool,
    woken_by: WakeReason,
}

impl FiberEntry {
    fn ready() -> Self {
        Self {
            status: FiberStatus::Ready,
            permit: false,
            woken_by: WakeReason::Unparked,
        }
    }
}

struct PendingFiber {
    id: FiberId,
    body: Box<dyn FnOnce() + Send + 'static>,
}

#[derive(Default)]
struct SchedulerState {
    /// the fiber currently holding the baton.
    running: Option<FiberId>,

    /// fibers waiting for the baton in FIFO order.
    ready: VecDeque<FiberId>,

    /// every launched fiber that has not finished.
    fibers: HashMap<FiberId, FiberEntry>,

    /// threads to join once the loop drains.
    joins: Vec<(FiberId, JoinHandle<()>)>,
}

impl SchedulerState {
    /// Hands the baton to the first ready fiber, returning false when
    /// there was nobody to run.
    fn dispatch(&mut self) -> bool {
        while let Some(next) = self.ready.pop_front() {
            if let Some(entry) = self.fibers.get_mut(&next) {
                if entry.status == FiberStatus::Ready {
                    entry.status = FiberStatus::Running;
                    self.running = Some(next);
                    return true;
                }
            }
        }
        false
    }

    /// Moves every parked fiber whose deadline passed onto the ready queue.
    fn expire(&mut self, now: Instant) {
        let mut expired: Vec<FiberId> = self
            .fibers
            .iter()
            .filter_map(|(id, entry)| match entry.status {
                FiberStatus::Parked {
                    deadline: Some(deadline),
                } if deadline <= now => Some(*id),
                _ => None,
            })
            .collect();
        expired.sort_unstable();

        for id in expired {
            if let Some(entry) = self.fibers.get_mut(&id) {
                entry.status = FiberStatus::Ready;
                entry.woken_by = WakeReason::TimedOut;
                self.ready.push_back(id);
            }
        }
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.fibers
            .values()
            .filter_map(|entry| match entry.status {
                FiberStatus::Parked { deadline } => deadline,
                _ => None,
            })
            .min()
    }

    /// Readies a parked fiber, or leaves a permit for its next park.
    fn unpark(&mut self, id: FiberId) {
        let Some(entry) = self.fibers.get_mut(&id) else {
            return;
        };

        if let FiberStatus::Parked { .. } = entry.status {
            entry.status = FiberStatus::Ready;
            entry.woken_by = WakeReason::Unparked;
            self.ready.push_back(id);
        } else {
            entry.permit = true;
        }
    }
}

pub(crate) struct SchedulerInner {
    config: SchedulerConfig,
    next_id: AtomicU64,

    /// fibers spawned but not yet launched, fed from any thread.
    incoming: ConcurrentQueue<PendingFiber>,

    state: Mutex<SchedulerState>,

    /// signalled whenever the baton or the ready queue changes.
    turn: Condvar,
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state
            .lock()
            .unwrap_or_else(|_| fatal(ProtocolViolation::LockPoisoned("scheduler")))
    }

    fn await_turn<'a>(
        &self,
        mut state: MutexGuard<'a, SchedulerState>,
        id: FiberId,
    ) -> MutexGuard<'a, SchedulerState> {
        while state.running != Some(id) {
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(|_| fatal(ProtocolViolation::LockPoisoned("scheduler")));
        }
        state
    }

    fn launch(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        pending: PendingFiber,
    ) -> Result<(), SchedulerError> {
        let PendingFiber { id, body } = pending;
        let fiber = FiberRef {
            scheduler: Arc::clone(self),
            id,
        };

        let mut builder = thread::Builder::new().name(format!("{}-{}", self.config.get_name(), id));
        if let Some(bytes) = self.config.get_stack_size() {
            builder = builder.stack_size(bytes);
        }

        state.fibers.insert(id, FiberEntry::ready());
        state.ready.push_back(id);

        match builder.spawn(move || fiber_main(fiber, body)) {
            Ok(handle) => {
                tracing::debug!("Launched {}", id);
                state.joins.push((id, handle));
                Ok(())
            }
            Err(err) => {
                state.fibers.remove(&id);
                state.ready.retain(|other| *other != id);
                Err(err.into())
            }
        }
    }

    /// Blocks the calling fiber until the baton is handed to it.
    fn wait_turn(&self, id: FiberId) {
        let state = self.lock_state();
        drop(self.await_turn(state, id));
    }

    /// Releases everything owned by a finished fiber and frees the baton.
    fn finish(&self, id: FiberId) {
        let mut state = self.lock_state();
        state.fibers.remove(&id);
        state.ready.retain(|other| *other != id);
        if state.running == Some(id) {
            state.running = None;
        }
        tracing::debug!("Finished {}", id);
        drop(state);
        self.turn.notify_all();
    }

    pub(crate) fn park(&self, id: FiberId, deadline: Option<Instant>) -> WakeReason {
        let mut state = self.lock_state();
        debug_assert_eq!(Some(id), state.running, "only the running fiber may park");

        let Some(entry) = state.fibers.get_mut(&id) else {
            return WakeReason::Unparked;
        };

        if entry.permit {
            entry.permit = false;
            return WakeReason::Unparked;
        }

        if deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return WakeReason::TimedOut;
        }

        entry.status = FiberStatus::Parked { deadline };
        state.running = None;
        self.turn.notify_all();

        let state = self.await_turn(state, id);
        state
            .fibers
            .get(&id)
            .map_or(WakeReason::Unparked, |entry| entry.woken_by)
    }

    pub(crate) fn unpark(&self, id: FiberId) {
        let mut state = self.lock_state();
        state.unpark(id);
        drop(state);
        self.turn.notify_all();
    }

    pub(crate) fn yield_fiber(&self, id: FiberId) {
        let mut state = self.lock_state();
        if let Some(entry) = state.fibers.get_mut(&id) {
            entry.status = FiberStatus::Ready;
        }
        state.ready.push_back(id);
        state.running = None;
        self.turn.notify_all();
        drop(self.await_turn(state, id));
    }
}

fn fiber_main(fiber: FiberRef, body: Box<dyn FnOnce() + Send + 'static>) {
    let scheduler = Arc::clone(&fiber.scheduler);
    let id = fiber.id;

    // Runs on return and on unwind, so a panicking body still hands the
    // baton back.
    let _finish = RunOnDrop::new(move || scheduler.finish(id));

    fiber.scheduler.wait_turn(id);
    install_context(fiber);
    body();
}

/// `Scheduler` is the runtime context fibers belong to.
///
/// Fibers are spawned onto it from any thread and run, one at a time, by
/// [`Scheduler::run`] in the order they become ready.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                next_id: AtomicU64::new(1),
                incoming: ConcurrentQueue::unbounded(),
                state: Mutex::new(SchedulerState::default()),
                turn: Condvar::new(),
            }),
        }
    }

    /// Returns the scheduler running the current fiber, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        super::current().map(|fiber| Self {
            inner: fiber.scheduler,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// `spawn` queues `body` to run as a new fiber.
    ///
    /// The fiber starts once [`Self::run`] is (or already is) driving this
    /// scheduler.
    pub fn spawn<F>(&self, body: F) -> FiberId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = FiberId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let pending = PendingFiber {
            id,
            body: Box::new(body),
        };

        if self.inner.incoming.push(pending).is_err() {
            tracing::error!("Incoming fiber queue closed, dropping {}", id);
            return id;
        }

        // lock before notifying so a loop between its checks and its
        // wait cannot miss the new fiber.
        drop(self.inner.lock_state());
        self.inner.turn.notify_all();
        id
    }

    /// `run` drives the ready-queue loop until every fiber has finished.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NestedRun`] when called from a fiber,
    /// [`SchedulerError::SpawnFailed`] when a backing thread could not be
    /// created and [`SchedulerError::FiberPanicked`] when a fiber body
    /// panicked. Only the first failure is reported.
    pub fn run(&self) -> Result<(), SchedulerError> {
        if super::current().is_some() {
            return Err(SchedulerError::NestedRun);
        }

        let idle_slice = self.inner.config.get_idle_slice();
        let mut failure: Option<SchedulerError> = None;
        let mut state = self.inner.lock_state();

        loop {
            while let Ok(pending) = self.inner.incoming.pop() {
                if let Err(err) = self.inner.launch(&mut state, pending) {
                    tracing::error!("Failed to launch fiber: {:?}", err);
                    failure.get_or_insert(err);
                }
            }

            let now = Instant::now();
            state.expire(now);

            if state.running.is_none() {
                if state.dispatch() {
                    self.inner.turn.notify_all();
                } else if state.fibers.is_empty() && self.inner.incoming.is_empty() {
                    break;
                }
            }

            let slice: Duration = state
                .earliest_deadline()
                .map_or(idle_slice, |deadline| {
                    deadline.saturating_duration_since(now).min(idle_slice)
                });

            state = self
                .inner
                .turn
                .wait_timeout(state, slice)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|_| fatal(ProtocolViolation::LockPoisoned("scheduler")));
        }

        let joins = std::mem::take(&mut state.joins);
        drop(state);

        for (id, handle) in joins {
            if handle.join().is_err() {
                tracing::error!("{} panicked", id);
                failure.get_or_insert(SchedulerError::FiberPanicked(id));
            }
        }

        failure.map_or(Ok(()), Err)
    }
}
