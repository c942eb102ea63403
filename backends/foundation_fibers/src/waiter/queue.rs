use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::{fatal, ProtocolViolation};

use super::WaiterHandle;

/// `WaitQueue` is the FIFO of registered waiters.
///
/// Waiters join at the back and signals take from the front, so the first
/// waiter to register is the first one woken. Callers keep the queue behind
/// a lock; the queued flag on each handle mirrors membership.
#[derive(Debug, Default)]
pub struct WaitQueue {
    entries: VecDeque<Arc<WaiterHandle>>,
}

impl WaitQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` at the back of the queue.
    ///
    /// # Panics
    ///
    /// Raises [`ProtocolViolation::AlreadyQueued`] when the handle already
    /// sits on a queue.
    pub fn push(&mut self, handle: Arc<WaiterHandle>) {
        if !handle.mark_queued() {
            fatal(ProtocolViolation::AlreadyQueued);
        }
        self.entries.push_back(handle);
    }

    /// Takes the longest waiting handle.
    pub fn pop(&mut self) -> Option<Arc<WaiterHandle>> {
        let handle = self.entries.pop_front()?;
        handle.clear_queued();
        Some(handle)
    }

    /// Removes `handle` wherever it sits, returning false when it was no
    /// longer queued.
    pub fn detach(&mut self, handle: &Arc<WaiterHandle>) -> bool {
        let Some(position) = self
            .entries
            .iter()
            .position(|entry| Arc::ptr_eq(entry, handle))
        else {
            return false;
        };

        if let Some(removed) = self.entries.remove(position) {
            removed.clear_queued();
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
