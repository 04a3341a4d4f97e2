use std::time::Duration;

use crate::{Deferred, event_loop::LoopHandle, timing::Delay};

/// Extend `Future` with event loop operations.
pub trait DeferExt: Future {
    /// Runs the future on `handle`'s loop and exposes its output as a
    /// [`Deferred`].
    fn defer_on<T, E>(self, handle: &LoopHandle) -> Deferred<T, E>
    where
        Self: Future<Output = Result<T, E>> + Sized + 'static,
        T: 'static,
        E: 'static,
    {
        handle.spawn(self)
    }

    /// Holds the future back until `due` has elapsed, waiting on `handle`'s
    /// timer threads.
    fn delay(self, due: Duration, handle: &LoopHandle) -> Delay<Self>
    where
        Self: Sized,
    {
        Delay::new(self, due, handle.timers().clone())
    }
}

impl<T> DeferExt for T where T: Future {}
