//! Defines the `Deferred` single-fire result container.
//!
//! A `Deferred<T, E>` starts out pending and is settled by calling
//! [`succeed`](Deferred::succeed) or [`fail`](Deferred::fail). Handlers
//! registered with [`on_success`](Deferred::on_success) and
//! [`on_failure`](Deferred::on_failure) are kept in two FIFO queues.
//!
//! Settlement is a queue drain, not a broadcast: handlers are popped and run
//! one at a time, and a handler may settle the same deferred again. When that
//! happens the outer drain stops immediately, so handlers queued after the
//! redirecting one never see the original outcome. [`guard`](Deferred::guard)
//! and [`rescue_from`](Deferred::rescue_from) are built on exactly this.
//!
//! Deferreds are single-threaded. Clones share the same state, which is how
//! producers, combinators and consumers all observe one result.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll, Waker},
    time::Duration,
};

use tracing::{debug, trace};

use crate::{
    error::TimedOut,
    reactor::{Reactor, TimerHandle},
};

type Handler<V> = Box<dyn FnOnce(&V)>;

/// Observable settlement state of a [`Deferred`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Not settled yet.
    Pending,
    /// Last settled with [`Deferred::succeed`].
    Succeeded,
    /// Last settled with [`Deferred::fail`].
    Failed,
}

enum State<T, E> {
    Pending,
    Succeeded(Rc<T>),
    Failed(Rc<E>),
}

struct Inner<T, E> {
    state: State<T, E>,
    // Bumped on every settlement; a drain stops as soon as it changes.
    generation: u64,
    callbacks: VecDeque<Handler<T>>,
    errbacks: VecDeque<Handler<E>>,
    timer: Option<TimerHandle>,
}

impl<T, E> Inner<T, E> {
    fn settle(&mut self, state: State<T, E>) -> (u64, Option<TimerHandle>) {
        self.generation += 1;
        self.state = state;
        (self.generation, self.timer.take())
    }
}

/// A single-fire deferred result with success and failure handler queues.
pub struct Deferred<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Deferred")
            .field("status", &self.status())
            .field("callbacks", &inner.callbacks.len())
            .field("errbacks", &inner.errbacks.len())
            .finish()
    }
}

impl<T, E> Deferred<T, E> {
    /// Creates a pending deferred with no handlers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                generation: 0,
                callbacks: VecDeque::new(),
                errbacks: VecDeque::new(),
                timer: None,
            })),
        }
    }

    /// Returns the current settlement state.
    pub fn status(&self) -> Status {
        match self.inner.borrow().state {
            State::Pending => Status::Pending,
            State::Succeeded(_) => Status::Succeeded,
            State::Failed(_) => Status::Failed,
        }
    }

    /// Returns `true` if the deferred has not been settled.
    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    /// Returns `true` if both handles refer to the same deferred.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a copy of the settled outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        match &self.inner.borrow().state {
            State::Pending => None,
            State::Succeeded(value) => Some(Ok(T::clone(value))),
            State::Failed(error) => Some(Err(E::clone(error))),
        }
    }

    /// Registers `handler` to run on success.
    ///
    /// If the deferred already succeeded, `handler` runs immediately with the
    /// stored value, before this method returns. If it already failed,
    /// `handler` is dropped without running. Returns a handle to `self` so
    /// registrations can be chained.
    pub fn on_success(&self, handler: impl FnOnce(&T) + 'static) -> Self {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            if let State::Pending = inner.state {
                inner.callbacks.push_back(Box::new(handler));
                return self.clone();
            }
            match &inner.state {
                State::Succeeded(value) => Some(Rc::clone(value)),
                _ => None,
            }
        };
        if let Some(value) = settled {
            handler(&value);
        }
        self.clone()
    }

    /// Registers `handler` to run on failure.
    ///
    /// Mirrors [`on_success`](Self::on_success): immediate if already failed,
    /// queued if pending, never run if already succeeded.
    pub fn on_failure(&self, handler: impl FnOnce(&E) + 'static) -> Self {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            if let State::Pending = inner.state {
                inner.errbacks.push_back(Box::new(handler));
                return self.clone();
            }
            match &inner.state {
                State::Failed(error) => Some(Rc::clone(error)),
                _ => None,
            }
        };
        if let Some(error) = settled {
            handler(&error);
        }
        self.clone()
    }

    /// Registers `handler` to run on either outcome, like a `finally` clause.
    ///
    /// The handler receives `Ok(&value)` or `Err(&error)`. If the deferred is
    /// redirected to the other outcome during dispatch, the handler can run
    /// once per direction.
    pub fn bothback(&self, handler: impl Fn(Result<&T, &E>) + 'static) -> Self {
        let handler = Rc::new(handler);
        let on_error = Rc::clone(&handler);
        self.on_success(move |value| (*handler)(Ok(value)));
        self.on_failure(move |error| (*on_error)(Err(error)))
    }

    /// Settles the deferred successfully and drains the success queue.
    ///
    /// Handlers run in registration order. If a handler settles this deferred
    /// again, the remaining success handlers are skipped and the nested
    /// settlement drains its own queue before this call returns. A panic in a
    /// handler propagates to the caller.
    pub fn succeed(&self, value: T) {
        let value = Rc::new(value);
        let (generation, timer) = self
            .inner
            .borrow_mut()
            .settle(State::Succeeded(Rc::clone(&value)));
        if let Some(timer) = timer {
            timer.cancel();
        }
        trace!(generation, "deferred succeeded");

        let drained = self.drain(generation, &*value, |inner| inner.callbacks.pop_front());
        if drained {
            let discarded = std::mem::take(&mut self.inner.borrow_mut().errbacks);
            drop(discarded);
        }
    }

    /// Settles the deferred as failed and drains the failure queue.
    ///
    /// The mirror image of [`succeed`](Self::succeed).
    pub fn fail(&self, error: E) {
        let error = Rc::new(error);
        let (generation, timer) = self
            .inner
            .borrow_mut()
            .settle(State::Failed(Rc::clone(&error)));
        if let Some(timer) = timer {
            timer.cancel();
        }
        trace!(generation, "deferred failed");

        let drained = self.drain(generation, &*error, |inner| inner.errbacks.pop_front());
        if drained {
            let discarded = std::mem::take(&mut self.inner.borrow_mut().callbacks);
            drop(discarded);
        }
    }

    // Pops and runs handlers until the queue is empty (`true`) or a handler
    // re-settled the deferred (`false`). No borrow is held while a handler
    // runs, so handlers may freely register, succeed or fail.
    fn drain<V>(
        &self,
        generation: u64,
        value: &V,
        pop: fn(&mut Inner<T, E>) -> Option<Handler<V>>,
    ) -> bool {
        loop {
            let handler = {
                let mut inner = self.inner.borrow_mut();
                if inner.generation != generation {
                    debug!(generation, "settlement redirected during dispatch");
                    return false;
                }
                pop(&mut *inner)
            };
            match handler {
                Some(handler) => handler(value),
                None => return true,
            }
        }
    }

    pub(crate) fn downgrade(&self) -> WeakDeferred<T, E> {
        WeakDeferred {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static, E: 'static> Deferred<T, E> {
    /// Registers a success handler whose errors fail this deferred.
    ///
    /// Unlike [`on_success`](Self::on_success), an `Err` returned by `handler`
    /// is caught and turned into [`fail`](Self::fail) on this deferred,
    /// redirecting the remaining dispatch to the failure queue.
    pub fn safe_callback(&self, handler: impl FnOnce(&T) -> Result<(), E> + 'static) -> Self {
        let this = self.downgrade();
        self.on_success(move |value| {
            if let Err(error) = handler(value) {
                if let Some(this) = this.upgrade() {
                    this.fail(error);
                }
            }
        })
    }

    /// Registers a failure handler whose errors re-fail this deferred.
    ///
    /// An `Err` returned by `handler` becomes the new failure value seen by
    /// the failure handlers queued after it.
    pub fn safe_errback(&self, handler: impl FnOnce(&E) -> Result<(), E> + 'static) -> Self {
        let this = self.downgrade();
        self.on_failure(move |error| {
            if let Err(error) = handler(error) {
                if let Some(this) = this.upgrade() {
                    this.fail(error);
                }
            }
        })
    }

    /// Fails this deferred with [`TimedOut`] if it is still pending once
    /// `after` has elapsed on `reactor`.
    ///
    /// Settling the deferred first cancels the timer. Calling `timeout` again
    /// replaces the previous timer. Has no effect on a settled deferred.
    pub fn timeout(&self, reactor: &impl Reactor, after: Duration) -> Self
    where
        E: From<TimedOut>,
    {
        if !self.is_pending() {
            return self.clone();
        }
        let this = self.downgrade();
        let timer = reactor.schedule_timer(
            after,
            Box::new(move || {
                if let Some(this) = this.upgrade() {
                    if this.is_pending() {
                        debug!(?after, "deferred timed out");
                        this.fail(E::from(TimedOut::after(after)));
                    }
                }
            }),
        );
        if let Some(previous) = self.inner.borrow_mut().timer.replace(timer) {
            previous.cancel();
        }
        self.clone()
    }

    /// Returns a future that resolves with the outcome once this deferred
    /// settles.
    ///
    /// Handlers are registered on first poll. The same future is also
    /// available through `IntoFuture`, so a `Deferred` can be `.await`ed.
    pub fn settled(&self) -> Settled<T, E>
    where
        T: Clone,
        E: Clone,
    {
        Settled {
            deferred: self.clone(),
            slot: Rc::new(RefCell::new(Slot {
                outcome: None,
                waker: None,
            })),
            registered: false,
        }
    }
}

/// A non-owning reference to a [`Deferred`], used by handlers registered on
/// the deferred they settle.
pub(crate) struct WeakDeferred<T, E> {
    inner: Weak<RefCell<Inner<T, E>>>,
}

impl<T, E> Clone for WeakDeferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T, E> WeakDeferred<T, E> {
    pub(crate) fn upgrade(&self) -> Option<Deferred<T, E>> {
        self.inner.upgrade().map(|inner| Deferred { inner })
    }
}

struct Slot<T, E> {
    outcome: Option<Result<T, E>>,
    waker: Option<Waker>,
}

/// Future resolving with the outcome of a [`Deferred`].
///
/// Created by [`Deferred::settled`] or by awaiting a deferred directly.
#[must_use = "futures do nothing unless polled or .awaited"]
pub struct Settled<T, E> {
    deferred: Deferred<T, E>,
    slot: Rc<RefCell<Slot<T, E>>>,
    registered: bool,
}

impl<T, E> Settled<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn register(&mut self) {
        self.registered = true;
        let on_ok = Rc::clone(&self.slot);
        let on_err = Rc::clone(&self.slot);
        self.deferred.on_success(move |value| Self::store(&on_ok, Ok(value.clone())));
        self.deferred.on_failure(move |error| Self::store(&on_err, Err(error.clone())));
    }

    fn store(slot: &RefCell<Slot<T, E>>, outcome: Result<T, E>) {
        let waker = {
            let mut slot = slot.borrow_mut();
            if slot.outcome.is_none() {
                slot.outcome = Some(outcome);
            }
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T, E> Future for Settled<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.registered {
            this.register();
        }
        let mut slot = this.slot.borrow_mut();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T, E> IntoFuture for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled()
    }
}
