//! Bounded producer-consumer queue built on `FiberCond`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use foundation_fibers::synca::{EventInterlock, Interlock};
use foundation_fibers::{CondResult, FiberCond};

/// A bounded queue whose producers and consumers may be fibers, plain
/// threads, or a mix of both.
///
/// # Examples
///
/// ```
/// use foundation_testing::scenarios::ProducerConsumerQueue;
/// use std::thread;
///
/// let queue = ProducerConsumerQueue::new(2);
///
/// let queue_clone = queue.clone();
/// let producer = thread::spawn(move || {
///     for i in 0..5 {
///         queue_clone.push(i).unwrap();
///     }
/// });
///
/// let received: Vec<_> = (0..5).map(|_| queue.pop().unwrap()).collect();
/// producer.join().unwrap();
///
/// assert_eq!(received, vec![0, 1, 2, 3, 4]);
/// ```
pub struct ProducerConsumerQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ProducerConsumerQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    /// Serializes every access to `items`; the mutex only grants the
    /// interlock holder access and is never contended.
    interlock: EventInterlock,
    items: Mutex<VecDeque<T>>,
    not_empty: FiberCond,
    not_full: FiberCond,
    capacity: usize,
}

impl<T> Inner<T> {
    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        match self.items.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}

impl<T> ProducerConsumerQueue<T> {
    /// Creates a new queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                interlock: EventInterlock::new(),
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: FiberCond::new(),
                not_full: FiberCond::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Pushes an item, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the condition variable's error if a wait failed; the item is
    /// dropped in that case.
    pub fn push(&self, item: T) -> CondResult<()> {
        let inner = &self.inner;
        inner.interlock.wait()?;

        while inner.items().len() >= inner.capacity {
            if let Err(err) = inner.not_full.wait(&inner.interlock) {
                let _ = inner.interlock.notify();
                return Err(err);
            }
        }

        inner.items().push_back(item);
        inner.interlock.notify()?;
        inner.not_empty.signal()
    }

    /// Pops the oldest item, waiting while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns the condition variable's error if a wait failed.
    pub fn pop(&self) -> CondResult<T> {
        let inner = &self.inner;
        inner.interlock.wait()?;

        let item = loop {
            if let Some(item) = inner.items().pop_front() {
                break item;
            }
            if let Err(err) = inner.not_empty.wait(&inner.interlock) {
                let _ = inner.interlock.notify();
                return Err(err);
            }
        };

        inner.interlock.notify()?;
        inner.not_full.signal()?;
        Ok(item)
    }

    /// Returns the current number of items in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items().len()
    }

    /// Returns true if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the capacity of the queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}
