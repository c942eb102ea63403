/// RunOnDrop implements a type that runs a function when
/// it gets dropped, providing a similar convention to go's defer.
///
/// Unwinding counts as a drop, which is what lets fibers hand their
/// scheduler baton back even when their body panics.
pub struct RunOnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> RunOnDrop<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }

    /// Forgets the deferred function without running it.
    pub fn disarm(mut self) {
        self.0.take();
    }
}

impl<F: FnOnce()> Drop for RunOnDrop<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.0.take() {
            cb();
        }
    }
}
