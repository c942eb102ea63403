use std::cell::Cell;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::fiber::{self, Parker};

use super::WaiterChannel;

thread_local! {
    /// synthetic handles allocated on this thread and not yet released.
    static LIVE_SYNTHETIC_HANDLES: Cell<usize> = const { Cell::new(0) };
}

/// Returns how many synthetic waiter handles the current thread has
/// allocated and not yet released.
///
/// A slot is acquired and released by the same waiting call, so the count
/// goes back to its previous value once every wait on this thread returned.
#[must_use]
pub fn live_synthetic_handles() -> usize {
    LIVE_SYNTHETIC_HANDLES.with(Cell::get)
}

/// `WaiterHandle` is the per-wait object a condition variable queues.
///
/// Every fiber owns one for its whole life; plain threads get a fresh one
/// per wait.
#[derive(Debug)]
pub struct WaiterHandle {
    channel: WaiterChannel,

    /// set while the handle sits on a wait queue, only changed under
    /// that queue's lock.
    queued: AtomicBool,
}

impl WaiterHandle {
    pub(crate) fn new(parker: Parker) -> Self {
        Self {
            channel: WaiterChannel::new(parker),
            queued: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn channel(&self) -> &WaiterChannel {
        &self.channel
    }

    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    /// Marks the handle queued, returning false if it already was.
    pub(crate) fn mark_queued(&self) -> bool {
        !self.queued.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Ordering::SeqCst);
    }
}

/// `WaiterSlot` is the handle a single wait uses: borrowed from the running
/// fiber, or allocated for this wait alone.
///
/// Only the `Owned` variant is released when the slot goes away.
#[derive(Debug)]
pub enum WaiterSlot {
    Borrowed(Arc<WaiterHandle>),
    Owned(Arc<WaiterHandle>),
}

impl WaiterSlot {
    /// Borrows the running fiber's handle, or allocates one for the current
    /// thread.
    #[must_use]
    pub fn acquire() -> Self {
        match fiber::current_handle() {
            Some(handle) => WaiterSlot::Borrowed(handle),
            None => Self::allocate(),
        }
    }

    /// Allocates a synthetic handle owned by the current thread or fiber.
    #[must_use]
    pub fn allocate() -> Self {
        LIVE_SYNTHETIC_HANDLES.with(|live| live.set(live.get() + 1));
        WaiterSlot::Owned(Arc::new(WaiterHandle::new(Parker::current())))
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<WaiterHandle> {
        match self {
            WaiterSlot::Borrowed(handle) | WaiterSlot::Owned(handle) => handle,
        }
    }

    #[must_use]
    pub fn is_owned(&self) -> bool {
        matches!(self, WaiterSlot::Owned(_))
    }

    /// Gives the slot back. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WaiterSlot {
    fn drop(&mut self) {
        if self.is_owned() {
            let _ = LIVE_SYNTHETIC_HANDLES.try_with(|live| live.set(live.get().saturating_sub(1)));
        }
    }
}
