//! Loops that repeatedly start an operation until a stopping condition holds.
//!
//! Each iteration calls the block, which returns a deferred (or a plain value,
//! or an error); the next iteration starts only after the previous attempt
//! settled. Scheduling goes through a [`Driver`]: inline for code outside any
//! event loop, or a [`Reactor`](crate::Reactor) for code running inside one.
//! Settling the loop's result by any means, including a
//! [`timeout`](crate::Deferred::timeout) on it, stops further attempts.
//!
//! ```
//! use std::cell::Cell;
//!
//! use deferred::{Driver, Error, primitives::{failure, success}, repeat};
//!
//! let tries = Cell::new(0);
//! let connected = repeat::loop_until_success(&Driver::inline(), move || {
//!     tries.set(tries.get() + 1);
//!     if tries.get() < 3 { failure::<u32, Error>("refused") } else { success(tries.get()) }
//! });
//! assert_eq!(connected.outcome(), Some(Ok(3)));
//! ```

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use tracing::{debug, trace};

use crate::{
    Deferred, Driver,
    aggregate::{Aggregate, Policy, Tally},
    combinators::{Bound, IntoBound, IntoVerdict},
    primitives::success,
};

struct UntilSuccess;

impl<T: Clone, E> Policy<T, E> for UntilSuccess {
    type Output = T;
    type Error = E;

    fn settle(&mut self, tally: &Tally<T, E>) -> Option<Result<T, E>> {
        tally.first_success().cloned().map(Ok)
    }
}

struct UntilFailure;

impl<T, E: Clone> Policy<T, E> for UntilFailure {
    type Output = T;
    type Error = E;

    fn settle(&mut self, tally: &Tally<T, E>) -> Option<Result<T, E>> {
        tally.first_failure().cloned().map(Err)
    }
}

// Keeps going while `condition` holds for the latest success value, which is
// `None` before the first attempt.
struct While<C> {
    condition: C,
}

impl<T, E, C, V> Policy<T, E> for While<C>
where
    T: Clone,
    E: Clone,
    C: FnMut(Option<&T>) -> V,
    V: IntoVerdict<E>,
{
    type Output = Option<T>;
    type Error = E;

    fn settle(&mut self, tally: &Tally<T, E>) -> Option<Result<Option<T>, E>> {
        if let Some(error) = tally.first_failure() {
            return Some(Err(error.clone()));
        }
        let last = tally.last_success();
        match (self.condition)(last).into_verdict() {
            Ok(true) => None,
            Ok(false) => Some(Ok(last.cloned())),
            Err(error) => Some(Err(error)),
        }
    }
}

struct Run<T, E, P: Policy<T, E>, B> {
    aggregate: Aggregate<T, E, P>,
    block: RefCell<B>,
    driver: Driver,
    stopped: Rc<Cell<bool>>,
    attempts: Cell<usize>,
}

impl<T, E, P, B, R> Run<T, E, P, B>
where
    T: Clone + 'static,
    E: Clone + 'static,
    P: Policy<T, E, Error = E> + 'static,
    B: FnMut() -> R + 'static,
    R: IntoBound<E, Output = T>,
{
    fn start(driver: &Driver, policy: P, block: B) -> Deferred<P::Output, E> {
        let run = Rc::new(Run {
            aggregate: Aggregate::new(policy, 0),
            block: RefCell::new(block),
            driver: driver.clone(),
            stopped: Rc::new(Cell::new(false)),
            attempts: Cell::new(0),
        });
        let result = run.aggregate.result().clone();

        run.aggregate.check();
        let stopped = Rc::clone(&run.stopped);
        result.bothback(move |_| stopped.set(true));
        run.tick();
        result
    }

    fn tick(self: Rc<Self>) {
        let driver = self.driver.clone();
        driver.schedule_next(Box::new(move || {
            if self.stopped.get() {
                trace!(attempts = self.attempts.get(), "loop stopped");
                return;
            }
            if let Some(attempt) = self.attempt() {
                attempt.bothback(move |_| Rc::clone(&self).tick());
            }
        }));
    }

    fn attempt(&self) -> Option<Deferred<T, E>> {
        let attempt = self.attempts.get() + 1;
        self.attempts.set(attempt);
        debug!(attempt, "starting loop attempt");

        let outcome = (&mut *self.block.borrow_mut())().into_bound();
        let operation = match outcome {
            Ok(Bound::Deferred(operation)) => operation,
            Ok(Bound::Value(value)) => success(value),
            Err(error) => {
                self.aggregate.result().fail(error);
                return None;
            }
        };
        self.aggregate.register(&operation);
        Some(operation)
    }
}

/// Calls `block` until the deferred it returns succeeds, then succeeds with
/// that value. Never fails on its own, so it may run forever; bound it with a
/// [`timeout`](crate::Deferred::timeout) on the result.
pub fn loop_until_success<T, E, B, R>(driver: &Driver, block: B) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    B: FnMut() -> R + 'static,
    R: IntoBound<E, Output = T>,
{
    Run::start(driver, UntilSuccess, block)
}

/// Calls `block` until the deferred it returns fails, then fails with that
/// error. Never succeeds.
pub fn loop_until_failure<T, E, B, R>(driver: &Driver, block: B) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    B: FnMut() -> R + 'static,
    R: IntoBound<E, Output = T>,
{
    Run::start(driver, UntilFailure, block)
}

/// Calls `block` while `condition` holds for the most recent success value.
///
/// `condition` is evaluated once before any attempt with `None`, then after
/// every success with the latest value. The result succeeds with the last
/// success value (`None` if `block` never ran) once `condition` returns
/// false, and fails as soon as an attempt fails or `condition` itself returns
/// an error.
pub fn loop_while<T, E, C, V, B, R>(driver: &Driver, condition: C, block: B) -> Deferred<Option<T>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    C: FnMut(Option<&T>) -> V + 'static,
    V: IntoVerdict<E>,
    B: FnMut() -> R + 'static,
    R: IntoBound<E, Output = T>,
{
    Run::start(driver, While { condition }, block)
}

/// [`loop_while`] with the condition negated: stops once `condition` holds.
pub fn loop_until<T, E, C, V, B, R>(driver: &Driver, mut condition: C, block: B) -> Deferred<Option<T>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    C: FnMut(Option<&T>) -> V + 'static,
    V: IntoVerdict<E>,
    B: FnMut() -> R + 'static,
    R: IntoBound<E, Output = T>,
{
    let negated = move |last: Option<&T>| condition(last).into_verdict().map(|done| !done);
    loop_while(driver, negated, block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{blank, failure};

    #[test]
    fn while_never_runs_the_block_if_the_condition_starts_false() {
        let result = loop_while::<u8, u8, _, _, _, _>(
            &Driver::inline(),
            |_| false,
            || -> Deferred<u8, u8> { unreachable!("block must not run") },
        );
        assert_eq!(result.outcome(), Some(Ok(None)));
    }

    #[test]
    fn a_block_error_fails_the_loop() {
        let result = loop_until_success(&Driver::inline(), || {
            Err::<Deferred<u8, &'static str>, _>("cannot start")
        });
        assert_eq!(result.outcome(), Some(Err("cannot start")));
    }

    #[test]
    fn settling_the_result_stops_the_loop() {
        let pending = Rc::new(RefCell::new(Vec::new()));
        let started = Rc::clone(&pending);
        let result = loop_until_success(&Driver::inline(), move || {
            let attempt = blank::<u8, &str>();
            started.borrow_mut().push(attempt.clone());
            attempt
        });
        assert_eq!(pending.borrow().len(), 1);

        result.fail("gave up");
        let first = pending.borrow()[0].clone();
        first.fail("late");
        assert_eq!(pending.borrow().len(), 1);
        assert_eq!(result.outcome(), Some(Err("gave up")));
    }

    #[test]
    fn until_failure_fails_with_the_first_error() {
        let mut n = 0;
        let result = loop_until_failure(&Driver::inline(), move || {
            n += 1;
            if n < 4 { success::<u8, u8>(n) } else { failure(n) }
        });
        assert_eq!(result.outcome(), Some(Err(4)));
    }
}
