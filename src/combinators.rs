//! Sequencing combinators built purely on the public [`Deferred`] contract.
//!
//! `bind`, `transform` and `transform_error` return a new deferred.
//! `guard` and `rescue_from` instead register a handler on the same deferred
//! and use redirection during dispatch: a failing guard turns the remaining
//! success dispatch into a failure, a matching rescue turns the remaining
//! failure dispatch into a success. Handlers registered before the guard or
//! rescue still see the original outcome.
//!
//! # Example
//!
//! ```
//! use deferred::{Error, primitives::{constant, success}};
//!
//! let names = constant::<u32, Error>(42)
//!     .bind(|user_id| success(vec![format!("spoon-{user_id}"), "car".to_owned()]))
//!     .map(|products| products.join(", "));
//!
//! assert_eq!(names.outcome(), Some(Ok("spoon-42, car".to_owned())));
//! ```

use std::ops::Shr;

use crate::{
    Deferred,
    error::{GuardFailed, Rescue},
    primitives::success,
};

/// What a bound step produced: a plain value or another deferred to wait on.
#[derive(Debug)]
pub enum Bound<U, E> {
    /// Succeed with this value right away.
    Value(U),
    /// Settle the same way as this deferred.
    Deferred(Deferred<U, E>),
}

impl<U, E> From<Deferred<U, E>> for Bound<U, E> {
    fn from(deferred: Deferred<U, E>) -> Self {
        Bound::Deferred(deferred)
    }
}

/// Conversion of a step's return value into a [`Bound`].
///
/// Implemented for `Deferred`, `Bound`, and `Result`s of either, where `Err`
/// means the step itself failed.
pub trait IntoBound<E> {
    /// Success type of the bound step.
    type Output;

    /// Performs the conversion.
    fn into_bound(self) -> Result<Bound<Self::Output, E>, E>;
}

impl<U, E> IntoBound<E> for Bound<U, E> {
    type Output = U;

    fn into_bound(self) -> Result<Bound<U, E>, E> {
        Ok(self)
    }
}

impl<U, E> IntoBound<E> for Deferred<U, E> {
    type Output = U;

    fn into_bound(self) -> Result<Bound<U, E>, E> {
        Ok(Bound::Deferred(self))
    }
}

impl<B, E> IntoBound<E> for Result<B, E>
where
    B: IntoBound<E>,
{
    type Output = B::Output;

    fn into_bound(self) -> Result<Bound<B::Output, E>, E> {
        self.and_then(IntoBound::into_bound)
    }
}

/// Conversion of a predicate's return value into a verdict.
///
/// Implemented for `bool` and `Result<bool, E>`, where `Err` means the
/// predicate itself failed.
pub trait IntoVerdict<E> {
    /// Performs the conversion.
    fn into_verdict(self) -> Result<bool, E>;
}

impl<E> IntoVerdict<E> for bool {
    fn into_verdict(self) -> Result<bool, E> {
        Ok(self)
    }
}

impl<E> IntoVerdict<E> for Result<bool, E> {
    fn into_verdict(self) -> Result<bool, E> {
        self
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Succeeds or fails `target` the same way this deferred does.
    pub fn forward_to(&self, target: &Deferred<T, E>) -> Self {
        let (on_ok, on_err) = (target.clone(), target.clone());
        self.on_success(move |value| on_ok.succeed(value.clone()));
        self.on_failure(move |error| on_err.fail(error.clone()))
    }

    /// Passes the success value to `f` and settles like whatever `f` returns.
    ///
    /// If `f` returns a deferred, the result waits for it; if it returns a
    /// [`Bound::Value`], the result succeeds with that value; if it returns
    /// `Err`, the result fails. A failure of `self` is passed through and `f`
    /// never runs. Also available as the `>>` operator.
    ///
    /// Nested binds and a flat sequence of binds settle identically as long as
    /// every step returns a deferred. A step returning a plain value short
    /// circuits the waiting, so mixing both styles can change timing.
    pub fn bind<F, R>(&self, f: F) -> Deferred<R::Output, E>
    where
        F: FnOnce(T) -> R + 'static,
        R: IntoBound<E>,
        R::Output: Clone + 'static,
    {
        let result = Deferred::new();
        let (on_ok, on_err) = (result.clone(), result.clone());
        self.on_success(move |value| match f(value.clone()).into_bound() {
            Ok(Bound::Deferred(next)) => {
                next.forward_to(&on_ok);
            }
            Ok(Bound::Value(value)) => on_ok.succeed(value),
            Err(error) => on_ok.fail(error),
        });
        self.on_failure(move |error| on_err.fail(error.clone()));
        result
    }

    /// Transforms the success value with a fallible `f`.
    ///
    /// Whatever `f` returns becomes the literal success value, even if it is
    /// itself a deferred; an `Err` fails the result.
    pub fn transform<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: 'static,
        F: FnOnce(T) -> Result<U, E> + 'static,
    {
        let result = Deferred::new();
        let (on_ok, on_err) = (result.clone(), result.clone());
        self.on_success(move |value| match f(value.clone()) {
            Ok(value) => on_ok.succeed(value),
            Err(error) => on_ok.fail(error),
        });
        self.on_failure(move |error| on_err.fail(error.clone()));
        result
    }

    /// Transforms the success value with an infallible `f`.
    pub fn map<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.transform(move |value| Ok(f(value)))
    }

    /// Transforms the failure value; success passes through unchanged.
    pub fn transform_error<E2, F>(&self, f: F) -> Deferred<T, E2>
    where
        E2: 'static,
        F: FnOnce(E) -> E2 + 'static,
    {
        let result = Deferred::new();
        let (on_ok, on_err) = (result.clone(), result.clone());
        self.on_success(move |value| on_ok.succeed(value.clone()));
        self.on_failure(move |error| on_err.fail(f(error.clone())));
        result
    }

    /// Fails this deferred with [`GuardFailed`] unless `predicate` accepts the
    /// success value.
    ///
    /// The check is a success handler on this same deferred. Handlers
    /// registered before the guard see the success; handlers registered after
    /// it only run if the predicate passes. A predicate returning `Err` fails
    /// the deferred with that error instead. Successive guards are evaluated
    /// in order, stopping at the first rejection.
    pub fn guard<P, V>(&self, reason: impl Into<String>, predicate: P) -> Self
    where
        P: FnOnce(&T) -> V + 'static,
        V: IntoVerdict<E>,
        E: From<GuardFailed<T>>,
    {
        self.check(Some(reason.into()), predicate)
    }

    /// [`guard`](Self::guard) without a reason.
    pub fn ensure<P, V>(&self, predicate: P) -> Self
    where
        P: FnOnce(&T) -> V + 'static,
        V: IntoVerdict<E>,
        E: From<GuardFailed<T>>,
    {
        self.check(None, predicate)
    }

    fn check<P, V>(&self, reason: Option<String>, predicate: P) -> Self
    where
        P: FnOnce(&T) -> V + 'static,
        V: IntoVerdict<E>,
        E: From<GuardFailed<T>>,
    {
        let this = self.downgrade();
        self.on_success(move |value| {
            let error = match predicate(value).into_verdict() {
                Ok(true) => return,
                Ok(false) => E::from(GuardFailed::new(reason, value.clone())),
                Err(error) => error,
            };
            if let Some(this) = this.upgrade() {
                this.fail(error);
            }
        })
    }

    /// Turns a matching failure into a success with the value computed by
    /// `block`.
    ///
    /// Matchers are tried in the given order and the first match wins. When
    /// nothing matches, the failure continues to the failure handlers queued
    /// after this one. If `block` returns `Err`, the deferred fails with it.
    ///
    /// # Panics
    ///
    /// Panics if `matchers` is empty.
    pub fn rescue_from<M, F>(&self, matchers: impl IntoIterator<Item = M>, block: F) -> Self
    where
        M: Rescue<E> + 'static,
        F: FnOnce(E) -> Result<T, E> + 'static,
    {
        let matchers: Vec<M> = matchers.into_iter().collect();
        assert!(
            !matchers.is_empty(),
            "rescue_from must be given at least one matcher"
        );
        let this = self.downgrade();
        self.on_failure(move |error| {
            if !matchers.iter().any(|matcher| matcher.matches(error)) {
                return;
            }
            let Some(this) = this.upgrade() else {
                return;
            };
            match block(error.clone()) {
                Ok(value) => this.succeed(value),
                Err(error) => this.fail(error),
            }
        })
    }

    /// [`rescue_from`](Self::rescue_from) succeeding with `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if `matchers` is empty.
    pub fn rescue_from_default<M>(&self, matchers: impl IntoIterator<Item = M>) -> Self
    where
        M: Rescue<E> + 'static,
        T: Default,
    {
        self.rescue_from(matchers, |_| Ok(T::default()))
    }
}

impl<T, E, F, R> Shr<F> for Deferred<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    F: FnOnce(T) -> R + 'static,
    R: IntoBound<E>,
    R::Output: Clone + 'static,
{
    type Output = Deferred<R::Output, E>;

    fn shr(self, f: F) -> Self::Output {
        self.bind(f)
    }
}

/// A boxed step of [`chain`]. Receives `None` when it is the first step and
/// the previous step's success value otherwise.
pub type ChainStep<T, E> = Box<dyn FnOnce(Option<T>) -> Result<Bound<T, E>, E>>;

/// Boxes a closure into a [`ChainStep`].
pub fn step<T, E, F, R>(f: F) -> ChainStep<T, E>
where
    F: FnOnce(Option<T>) -> R + 'static,
    R: IntoBound<E, Output = T>,
{
    Box::new(move |previous| f(previous).into_bound())
}

/// Binds `steps` one after another, starting from a success with no value.
///
/// The result fails as soon as any step fails, and the remaining steps never
/// run; otherwise it succeeds with the last step's value. Returns `None` when
/// there are no steps at all, which is distinct from succeeding with nothing.
pub fn chain<T, E>(steps: impl IntoIterator<Item = ChainStep<T, E>>) -> Option<Deferred<T, E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    let mut steps = steps.into_iter();
    let first = steps.next()?;
    let mut composite = success::<Option<T>, E>(None).bind(first);
    for next in steps {
        composite = composite.bind(move |previous| next(Some(previous)));
    }
    Some(composite)
}
