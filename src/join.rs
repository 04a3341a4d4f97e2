//! Combinators waiting on a fixed set of deferreds.
//!
//! All three accept any iterable of deferreds and never look at the order in
//! which operations settle; collected values always follow input order.
//! With zero inputs the result settles immediately.
//!
//! ```
//! use deferred::{Error, join, primitives::{failure, success}};
//!
//! let all = join::join_successes([success::<u8, Error>(1), failure("nope"), success(3)]);
//! assert_eq!(all.outcome(), Some(Ok(vec![1, 3])));
//!
//! let both = join::in_parallel([success::<u8, Error>(1), failure("nope")]);
//! assert_eq!(both.outcome(), Some(Ok((vec![1], vec![Error::from("nope")]))));
//! ```

use thiserror::Error;

use crate::{
    Deferred,
    aggregate::{Aggregate, Policy, Tally},
};

/// Failure of [`join_first_success`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FirstSuccessError<E> {
    /// There was nothing to wait for.
    #[error("no operations to wait for")]
    Empty,

    /// Every operation failed; errors are in input order.
    #[error("all {} operations failed", .0.len())]
    AllFailed(Vec<E>),
}

impl<E> FirstSuccessError<E> {
    /// The collected failures, empty for [`FirstSuccessError::Empty`].
    pub fn failures(&self) -> &[E] {
        match self {
            FirstSuccessError::Empty => &[],
            FirstSuccessError::AllFailed(errors) => errors,
        }
    }
}

struct Successes {
    expected: usize,
}

impl<T: Clone, E> Policy<T, E> for Successes {
    type Output = Vec<T>;
    type Error = E;

    fn settle(&mut self, tally: &Tally<T, E>) -> Option<Result<Vec<T>, E>> {
        (tally.responded() >= self.expected).then(|| Ok(tally.successes().cloned().collect()))
    }
}

struct FirstSuccess {
    expected: usize,
}

impl<T: Clone, E: Clone> Policy<T, E> for FirstSuccess {
    type Output = T;
    type Error = FirstSuccessError<E>;

    fn settle(&mut self, tally: &Tally<T, E>) -> Option<Result<T, Self::Error>> {
        if let Some(value) = tally.first_success() {
            return Some(Ok(value.clone()));
        }
        if tally.responded() < self.expected {
            return None;
        }
        Some(Err(match self.expected {
            0 => FirstSuccessError::Empty,
            _ => FirstSuccessError::AllFailed(tally.failures().cloned().collect()),
        }))
    }
}

struct InParallel {
    expected: usize,
}

impl<T: Clone, E: Clone> Policy<T, E> for InParallel {
    type Output = (Vec<T>, Vec<E>);
    type Error = E;

    fn settle(&mut self, tally: &Tally<T, E>) -> Option<Result<Self::Output, E>> {
        (tally.responded() >= self.expected).then(|| {
            Ok((
                tally.successes().cloned().collect(),
                tally.failures().cloned().collect(),
            ))
        })
    }
}

fn join<T, E, P>(
    operations: impl IntoIterator<Item = Deferred<T, E>>,
    policy: impl FnOnce(usize) -> P,
) -> Deferred<P::Output, P::Error>
where
    T: Clone + 'static,
    E: Clone + 'static,
    P: Policy<T, E> + 'static,
{
    let operations: Vec<_> = operations.into_iter().collect();
    let aggregate = Aggregate::new(policy(operations.len()), operations.len());
    aggregate.check();
    for operation in &operations {
        aggregate.register(operation);
    }
    aggregate.result().clone()
}

/// Waits for every operation to settle and succeeds with the success values,
/// in input order. Failures are dropped, so the result never fails.
pub fn join_successes<T, E>(operations: impl IntoIterator<Item = Deferred<T, E>>) -> Deferred<Vec<T>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    join(operations, |expected| Successes { expected })
}

/// Succeeds with the first operation to succeed, without waiting for the
/// others.
///
/// Fails with [`FirstSuccessError::AllFailed`] once every operation failed,
/// or with [`FirstSuccessError::Empty`] when given no operations.
pub fn join_first_success<T, E>(
    operations: impl IntoIterator<Item = Deferred<T, E>>,
) -> Deferred<T, FirstSuccessError<E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    join(operations, |expected| FirstSuccess { expected })
}

/// Waits for every operation to settle and succeeds with the success values
/// and the failure values, each in input order. Never fails.
pub fn in_parallel<T, E>(
    operations: impl IntoIterator<Item = Deferred<T, E>>,
) -> Deferred<(Vec<T>, Vec<E>), E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    join(operations, |expected| InParallel { expected })
}
