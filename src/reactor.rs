//! The boundary to whatever event loop drives deferred results.
//!
//! Deferreds never block and never spawn threads. The only things they need
//! from the outside world are "run this later on the same thread" (used by the
//! loop combinators between attempts) and "run this after a delay unless
//! cancelled" (used by [`Deferred::timeout`](crate::Deferred::timeout)). Both
//! are expressed by the [`Reactor`] trait. [`EventLoop`](crate::EventLoop) is
//! the implementation shipped with this crate.
//!
//! [`Driver`] is the strategy the loop combinators schedule attempts through.
//! It is either backed by a reactor, or by an inline trampoline for code that
//! runs outside any event loop.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::task::AtomicWaker;

/// Unit of work handed to a reactor.
pub type Job = Box<dyn FnOnce()>;

/// Contract consumed from an external event loop.
///
/// All methods are called from the thread that drives the reactor.
pub trait Reactor {
    /// Returns `true` while the reactor is actively running jobs.
    fn is_driving(&self) -> bool;

    /// Runs `job` on a later turn of the reactor, on the same thread.
    fn schedule_next(&self, job: Job);

    /// Runs `job` once `after` has elapsed, unless the returned handle is
    /// cancelled first.
    fn schedule_timer(&self, after: Duration, job: Job) -> TimerHandle;
}

impl<R: Reactor + ?Sized> Reactor for Rc<R> {
    fn is_driving(&self) -> bool {
        (**self).is_driving()
    }

    fn schedule_next(&self, job: Job) {
        (**self).schedule_next(job);
    }

    fn schedule_timer(&self, after: Duration, job: Job) -> TimerHandle {
        (**self).schedule_timer(after, job)
    }
}

#[derive(Default)]
struct TimerState {
    cancelled: AtomicBool,
    waker: AtomicWaker,
}

/// A handle for cancelling a scheduled timer.
///
/// Cancelling a timer that already fired has no effect. Reactors wake the
/// timer's task on cancellation so that it can be dropped without waiting for
/// the deadline.
///
/// The handle is `Send` and `Sync` so that reactors built on multi-threaded
/// runtimes can move it into their timer tasks.
#[derive(Clone, Default)]
pub struct TimerHandle {
    state: Arc<TimerState>,
}

impl TimerHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the timer.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Relaxed);
        self.state.waker.wake();
    }

    /// Returns `true` if [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Relaxed)
    }

    /// A future that resolves once the timer is cancelled.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            handle: self.clone(),
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Future returned by [`TimerHandle::cancelled`].
#[must_use = "futures do nothing unless polled or .awaited"]
pub struct Cancelled {
    handle: TimerHandle,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        if self.handle.is_cancelled() {
            return std::task::Poll::Ready(());
        }
        self.handle.state.waker.register(cx.waker());
        // Re-check after registering so a concurrent cancel is not lost.
        if self.handle.is_cancelled() {
            std::task::Poll::Ready(())
        } else {
            std::task::Poll::Pending
        }
    }
}

// Runs jobs scheduled from inside other jobs after the current one returns,
// so a chain of synchronously settling attempts never grows the stack.
#[derive(Default)]
struct Trampoline {
    queue: RefCell<VecDeque<Job>>,
    draining: Cell<bool>,
}

struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Trampoline {
    fn schedule(&self, job: Job) {
        self.queue.borrow_mut().push_back(job);
        if self.draining.replace(true) {
            return;
        }
        let _draining = Draining(&self.draining);
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

/// Strategy used by the loop combinators to schedule the next attempt.
///
/// - [`Driver::inline`] runs attempts on the calling thread. Jobs scheduled
///   while another job is running are queued and drained iteratively by the
///   outermost call, so thousands of synchronously failing attempts run in
///   constant stack depth.
/// - [`Driver::reactor`] defers every attempt to the reactor's next tick,
///   which bounds the stack and lets the reactor interleave other work.
#[derive(Clone)]
pub struct Driver {
    strategy: Strategy,
}

#[derive(Clone)]
enum Strategy {
    Inline(Rc<Trampoline>),
    Reactor(Rc<dyn Reactor>),
}

impl Driver {
    /// A driver that runs attempts synchronously, without recursion.
    pub fn inline() -> Self {
        Self {
            strategy: Strategy::Inline(Rc::default()),
        }
    }

    /// A driver that schedules each attempt on `reactor`'s next tick.
    pub fn reactor(reactor: impl Reactor + 'static) -> Self {
        Self {
            strategy: Strategy::Reactor(Rc::new(reactor)),
        }
    }

    /// Picks [`Driver::reactor`] if `reactor` is currently driving, otherwise
    /// [`Driver::inline`].
    pub fn detect(reactor: impl Reactor + 'static) -> Self {
        if reactor.is_driving() {
            Self::reactor(reactor)
        } else {
            Self::inline()
        }
    }

    /// Returns `true` if this driver defers to a reactor.
    pub fn is_reactor(&self) -> bool {
        matches!(self.strategy, Strategy::Reactor(_))
    }

    /// Schedules `job` according to the strategy.
    pub fn schedule_next(&self, job: Job) {
        match &self.strategy {
            Strategy::Inline(trampoline) => trampoline.schedule(job),
            Strategy::Reactor(reactor) => reactor.schedule_next(job),
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::inline()
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.strategy {
            Strategy::Inline(_) => "Inline",
            Strategy::Reactor(_) => "Reactor",
        };
        f.debug_tuple("Driver").field(&name).finish()
    }
}
