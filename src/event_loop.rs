//! A small single-threaded reactor for driving deferred results.
//!
//! [`EventLoop`] runs jobs and futures on a [`LocalPool`], on the thread that
//! calls [`run`](EventLoop::run) or [`block_on`](EventLoop::block_on). Timers
//! are [`Delay`] futures whose waiting happens on a small thread pool, so the
//! loop thread never sleeps while there is other work to do.
//!
//! ```
//! use std::time::Duration;
//!
//! use deferred::{Deferred, Driver, Error, EventLoop, repeat};
//!
//! let mut event_loop = EventLoop::new().unwrap();
//! let handle = event_loop.handle();
//!
//! let slow: Deferred<u8, Error> = Deferred::new();
//! slow.timeout(&handle, Duration::from_millis(10));
//!
//! let error = event_loop.block_on(&slow).unwrap_err();
//! assert_eq!(error.to_string(), "timed out after 10ms");
//! ```

use std::{cell::Cell, fmt, io, rc::Rc, time::Duration};

use futures::{
    executor::{LocalPool, LocalSpawner, ThreadPool, ThreadPoolBuilder},
    future::{self, Either},
    task::LocalSpawnExt,
};
use tracing::{debug, trace, warn};

use crate::{
    Deferred,
    reactor::{Job, Reactor, TimerHandle},
    timing::Delay,
};

const DEFAULT_TIMER_THREADS: usize = 2;

/// Configures and builds an [`EventLoop`].
#[derive(Debug, Clone)]
pub struct EventLoopBuilder {
    timer_threads: usize,
    thread_name_prefix: Option<String>,
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self {
            timer_threads: DEFAULT_TIMER_THREADS,
            thread_name_prefix: None,
        }
    }
}

impl EventLoopBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads waiting on timer deadlines. Clamped to at least one.
    pub fn timer_threads(mut self, threads: usize) -> Self {
        self.timer_threads = threads.max(1);
        self
    }

    /// Name prefix for the timer threads.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    /// Builds the event loop.
    ///
    /// # Errors
    ///
    /// Fails if the timer threads cannot be spawned.
    pub fn build(self) -> io::Result<EventLoop> {
        let mut timers = ThreadPoolBuilder::new();
        timers.pool_size(self.timer_threads);
        if let Some(prefix) = &self.thread_name_prefix {
            timers.name_prefix(prefix.as_str());
        }
        let timers = timers.create()?;
        debug!(timer_threads = self.timer_threads, "event loop created");

        let pool = LocalPool::new();
        let handle = LoopHandle {
            spawner: pool.spawner(),
            driving: Rc::new(Cell::new(false)),
            timers,
        };
        Ok(EventLoop { pool, handle })
    }
}

/// A single-threaded reactor built on [`LocalPool`].
pub struct EventLoop {
    pool: LocalPool,
    handle: LoopHandle,
}

impl EventLoop {
    /// Creates an event loop with default settings.
    ///
    /// # Errors
    ///
    /// Fails if the timer threads cannot be spawned.
    pub fn new() -> io::Result<Self> {
        EventLoopBuilder::new().build()
    }

    /// Returns a builder for configuring an event loop.
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    /// A cloneable handle for scheduling work on this loop.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Runs until there is no more work, including pending timers.
    pub fn run(&mut self) {
        let _driving = Driving::enter(&self.handle.driving);
        self.pool.run();
    }

    /// Runs every job that is ready without waiting on timers.
    pub fn run_until_stalled(&mut self) {
        let _driving = Driving::enter(&self.handle.driving);
        self.pool.run_until_stalled();
    }

    /// Runs the loop until `deferred` settles and returns its outcome.
    ///
    /// Blocks forever if nothing scheduled on the loop ever settles it.
    pub fn block_on<T, E>(&mut self, deferred: &Deferred<T, E>) -> Result<T, E>
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        let _driving = Driving::enter(&self.handle.driving);
        self.pool.run_until(deferred.settled())
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

// Marks the loop as driving for as long as it is alive.
struct Driving<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> Driving<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for Driving<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

/// Handle to an [`EventLoop`], usable as its [`Reactor`].
#[derive(Clone)]
pub struct LoopHandle {
    spawner: LocalSpawner,
    driving: Rc<Cell<bool>>,
    timers: ThreadPool,
}

impl LoopHandle {
    /// Runs `future` on the loop and settles the returned deferred with its
    /// output.
    pub fn spawn<T, E, F>(&self, future: F) -> Deferred<T, E>
    where
        T: 'static,
        E: 'static,
        F: Future<Output = Result<T, E>> + 'static,
    {
        let deferred = Deferred::new();
        let settle = deferred.clone();
        self.spawn_local(async move {
            match future.await {
                Ok(value) => settle.succeed(value),
                Err(error) => settle.fail(error),
            }
        });
        deferred
    }

    pub(crate) fn timers(&self) -> &ThreadPool {
        &self.timers
    }

    fn spawn_local(&self, task: impl Future<Output = ()> + 'static) {
        if let Err(error) = self.spawner.spawn_local(task) {
            warn!(%error, "event loop refused a task");
        }
    }
}

impl Reactor for LoopHandle {
    fn is_driving(&self) -> bool {
        self.driving.get()
    }

    fn schedule_next(&self, job: Job) {
        self.spawn_local(async move { job() });
    }

    fn schedule_timer(&self, after: Duration, job: Job) -> TimerHandle {
        let handle = TimerHandle::new();
        let cancelled = handle.cancelled();
        let delay = Delay::new(future::ready(()), after, self.timers.clone());
        let timer = handle.clone();
        self.spawn_local(async move {
            match future::select(Box::pin(delay), cancelled).await {
                Either::Left(_) if !timer.is_cancelled() => {
                    trace!(?after, "timer fired");
                    job();
                }
                _ => trace!(?after, "timer cancelled"),
            }
        });
        handle
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("driving", &self.driving.get())
            .finish_non_exhaustive()
    }
}
