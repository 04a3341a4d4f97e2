//! Timing utilities backing reactor timers.
//!
//! [`Delay`] holds back an inner future until a deadline has passed. It does
//! not need a timer-aware runtime: the waiting happens on a thread of a
//! `futures` thread pool, which wakes the task once the deadline is reached.
//! Dropping a `Delay` releases its sleeping thread right away.

use std::{
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    thread::{self, Thread},
    time::{Duration, Instant},
};

use futures::executor::ThreadPool;
use pin_project_lite::pin_project;
use tracing::trace;

#[derive(Default)]
struct Sleeper {
    fired: AtomicBool,
    abandoned: AtomicBool,
    thread: Mutex<Option<Thread>>,
}

impl Sleeper {
    fn sleep_until(&self, deadline: Instant) -> bool {
        if let Ok(mut thread) = self.thread.lock() {
            *thread = Some(thread::current());
        }
        loop {
            if self.abandoned.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

// Wakes the sleeping thread when the owning `Delay` goes away.
struct Abandon(Arc<Sleeper>);

impl Drop for Abandon {
    fn drop(&mut self) {
        self.0.abandoned.store(true, Ordering::Release);
        if let Ok(thread) = self.0.thread.lock() {
            if let Some(thread) = thread.as_ref() {
                thread.unpark();
            }
        }
    }
}

pin_project! {
    /// A future that begins polling its inner future only after a delay.
    ///
    /// The delay is counted from the moment the `Delay` is created. The first
    /// poll before the deadline hands a sleeper job to the timer pool; polls
    /// in between are cheap.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub struct Delay<F> {
        #[pin]
        future: F,
        deadline: Instant,
        sleeping: bool,
        sleeper: Abandon,
        timers: ThreadPool,
    }
}

impl<F> Delay<F> {
    /// Creates a `Delay` that polls `future` once `delay` has elapsed, using
    /// `timers` to wait.
    ///
    /// A more convenient way to construct this is
    /// [`DeferExt::delay`](crate::future_ext::DeferExt::delay).
    pub fn new(future: F, delay: Duration, timers: ThreadPool) -> Self {
        Delay {
            future,
            deadline: Instant::now() + delay,
            sleeping: false,
            sleeper: Abandon(Arc::default()),
            timers,
        }
    }

    /// The instant after which the inner future is polled.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    // Returns `true` while the deadline has not been reached.
    fn handle_delay(self: Pin<&mut Self>, cx: &mut Context<'_>) -> bool {
        let proj = self.project();
        if Instant::now() >= *proj.deadline {
            *proj.sleeping = false;
            return false;
        }
        let sleeper = &proj.sleeper.0;
        if *proj.sleeping && !sleeper.fired.load(Ordering::Acquire) {
            return true;
        }

        // Arm, or re-arm after a sleeper woke up early.
        sleeper.fired.store(false, Ordering::Release);
        let waker = cx.waker().clone();
        let deadline = *proj.deadline;
        let sleeper = Arc::clone(sleeper);
        trace!(?deadline, "arming delay");
        proj.timers.spawn_ok(async move {
            if sleeper.sleep_until(deadline) {
                sleeper.fired.store(true, Ordering::Release);
                waker.wake();
            }
        });
        *proj.sleeping = true;
        true
    }
}

impl<F> Future for Delay<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.as_mut().handle_delay(cx) {
            return Poll::Pending;
        }
        self.project().future.poll(cx)
    }
}
