//! Shared bookkeeping for combinators that watch many deferreds and settle one.
//!
//! Every watched operation gets a slot in a `Tally`, in registration order. A
//! `Policy` looks at the tally after each response and decides whether the
//! aggregate result is done and, if so, what it settles with. Joins and loops
//! only differ in their policy.

use std::{cell::RefCell, rc::Rc};

use tracing::debug;

use crate::Deferred;

pub(crate) enum Slot<T, E> {
    Waiting,
    Succeeded(T),
    Failed(E),
}

/// Slots plus running counters, so that policies can decide in constant time
/// after every response.
pub(crate) struct Tally<T, E> {
    slots: Vec<Slot<T, E>>,
    responded: usize,
    succeeded: usize,
    first_success: Option<usize>,
    last_success: Option<usize>,
    first_failure: Option<usize>,
}

impl<T, E> Tally<T, E> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            responded: 0,
            succeeded: 0,
            first_success: None,
            last_success: None,
            first_failure: None,
        }
    }

    fn open(&mut self) -> usize {
        self.slots.push(Slot::Waiting);
        self.slots.len() - 1
    }

    // A slot is written again when its operation is redirected during
    // dispatch, e.g. a success turned into a failure by a guard. Counters
    // pointing at the old outcome are cleared rather than searched for a
    // replacement.
    fn record(&mut self, index: usize, outcome: Result<T, E>) {
        match &self.slots[index] {
            Slot::Waiting => self.responded += 1,
            Slot::Succeeded(_) => {
                self.succeeded -= 1;
                if self.first_success == Some(index) {
                    self.first_success = None;
                }
                if self.last_success == Some(index) {
                    self.last_success = None;
                }
            }
            Slot::Failed(_) => {
                if self.first_failure == Some(index) {
                    self.first_failure = None;
                }
            }
        }
        self.slots[index] = match outcome {
            Ok(value) => {
                self.succeeded += 1;
                self.first_success.get_or_insert(index);
                self.last_success = Some(index);
                Slot::Succeeded(value)
            }
            Err(error) => {
                self.first_failure.get_or_insert(index);
                Slot::Failed(error)
            }
        };
    }

    /// Success values in registration order.
    pub(crate) fn successes(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Succeeded(value) => Some(value),
            _ => None,
        })
    }

    /// Failure values in registration order.
    pub(crate) fn failures(&self) -> impl Iterator<Item = &E> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Failed(error) => Some(error),
            _ => None,
        })
    }

    /// Number of operations that have settled.
    pub(crate) fn responded(&self) -> usize {
        self.responded
    }

    /// Number of operations currently recorded as succeeded.
    pub(crate) fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// The earliest recorded success.
    pub(crate) fn first_success(&self) -> Option<&T> {
        self.first_success.and_then(|index| match &self.slots[index] {
            Slot::Succeeded(value) => Some(value),
            _ => None,
        })
    }

    /// The most recently recorded success.
    pub(crate) fn last_success(&self) -> Option<&T> {
        self.last_success.and_then(|index| match &self.slots[index] {
            Slot::Succeeded(value) => Some(value),
            _ => None,
        })
    }

    /// The earliest recorded failure.
    pub(crate) fn first_failure(&self) -> Option<&E> {
        self.first_failure.and_then(|index| match &self.slots[index] {
            Slot::Failed(error) => Some(error),
            _ => None,
        })
    }
}

/// Decides when an aggregate is done and what it settles with.
pub(crate) trait Policy<T, E> {
    type Output;
    type Error;

    /// Returns `None` while the aggregate is not done, and the settlement
    /// once it is.
    fn settle(&mut self, tally: &Tally<T, E>) -> Option<Result<Self::Output, Self::Error>>;
}

struct State<T, E, P> {
    tally: Tally<T, E>,
    policy: P,
    finished: bool,
}

pub(crate) struct Aggregate<T, E, P: Policy<T, E>> {
    state: Rc<RefCell<State<T, E, P>>>,
    result: Deferred<P::Output, P::Error>,
}

impl<T, E, P: Policy<T, E>> Clone for Aggregate<T, E, P> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            result: self.result.clone(),
        }
    }
}

impl<T, E, P> Aggregate<T, E, P>
where
    T: Clone + 'static,
    E: Clone + 'static,
    P: Policy<T, E> + 'static,
{
    pub(crate) fn new(policy: P, capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                tally: Tally::with_capacity(capacity),
                policy,
                finished: false,
            })),
            result: Deferred::new(),
        }
    }

    pub(crate) fn result(&self) -> &Deferred<P::Output, P::Error> {
        &self.result
    }

    /// Watches `operation`, giving it the next slot.
    pub(crate) fn register(&self, operation: &Deferred<T, E>) {
        let index = self.state.borrow_mut().tally.open();
        let (on_ok, on_err) = (self.clone(), self.clone());
        operation.on_success(move |value| on_ok.record(index, Ok(value.clone())));
        operation.on_failure(move |error| on_err.record(index, Err(error.clone())));
    }

    fn record(&self, index: usize, outcome: Result<T, E>) {
        self.state.borrow_mut().tally.record(index, outcome);
        self.check();
    }

    /// Settles the result if the policy says it is done.
    ///
    /// The result is settled at most once, and never if something else
    /// settled it first.
    pub(crate) fn check(&self) {
        let settlement = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            if state.finished || !self.result.is_pending() {
                return;
            }
            let Some(settlement) = state.policy.settle(&state.tally) else {
                return;
            };
            state.finished = true;
            debug!(
                responded = state.tally.responded(),
                succeeded = state.tally.succeeded(),
                "aggregate finished"
            );
            settlement
        };
        match settlement {
            Ok(output) => self.result.succeed(output),
            Err(error) => self.result.fail(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountSuccesses(usize);

    impl Policy<u8, u8> for CountSuccesses {
        type Output = usize;
        type Error = u8;

        fn settle(&mut self, tally: &Tally<u8, u8>) -> Option<Result<usize, u8>> {
            (tally.succeeded() >= self.0).then(|| Ok(tally.responded()))
        }
    }

    #[test]
    fn finishes_once() {
        let aggregate = Aggregate::new(CountSuccesses(1), 2);
        let (a, b) = (Deferred::new(), Deferred::new());
        aggregate.register(&a);
        aggregate.register(&b);
        b.fail(9);
        assert!(aggregate.result().is_pending());
        a.succeed(1);
        assert_eq!(aggregate.result().outcome(), Some(Ok(2)));
    }

    #[test]
    fn externally_settled_result_is_left_alone() {
        let aggregate = Aggregate::new(CountSuccesses(1), 1);
        let a = Deferred::new();
        aggregate.register(&a);
        aggregate.result().fail(0);
        a.succeed(1);
        assert_eq!(aggregate.result().outcome(), Some(Err(0)));
    }

    #[test]
    fn counters_follow_responses() {
        let mut tally = Tally::<u8, &str>::with_capacity(3);
        let (a, b, c) = (tally.open(), tally.open(), tally.open());
        tally.record(b, Err("b"));
        tally.record(c, Ok(3));
        tally.record(a, Ok(1));

        assert_eq!(tally.responded(), 3);
        assert_eq!(tally.succeeded(), 2);
        assert_eq!(tally.first_success(), Some(&3));
        assert_eq!(tally.last_success(), Some(&1));
        assert_eq!(tally.first_failure(), Some(&"b"));
        assert_eq!(tally.successes().collect::<Vec<_>>(), [&1, &3]);
    }

    #[test]
    fn redirected_slots_are_recounted() {
        let mut tally = Tally::<u8, &str>::with_capacity(1);
        let only = tally.open();
        tally.record(only, Ok(7));
        tally.record(only, Err("rejected"));

        assert_eq!(tally.responded(), 1);
        assert_eq!(tally.succeeded(), 0);
        assert_eq!(tally.first_success(), None);
        assert_eq!(tally.last_success(), None);
        assert_eq!(tally.first_failure(), Some(&"rejected"));
    }

    #[test]
    fn a_redirected_success_no_longer_counts() {
        let aggregate = Aggregate::new(CountSuccesses(2), 2);
        let (a, b) = (Deferred::<u8, u8>::new(), Deferred::new());
        aggregate.register(&a);
        aggregate.register(&b);
        let rejected = a.clone();
        a.on_success(move |_| rejected.fail(0));

        a.succeed(1);
        b.succeed(2);
        assert!(aggregate.result().is_pending());
    }
}
