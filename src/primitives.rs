//! Trivial constructors returning deferred results.
//!
//! Useful wherever an API has to hand back a [`Deferred`] but the outcome is
//! already known, and as building blocks for the combinators.

use crate::Deferred;

/// Returns a deferred that has already succeeded with `value`.
pub fn success<T, E>(value: T) -> Deferred<T, E> {
    let deferred = blank();
    deferred.succeed(value);
    deferred
}

/// Returns a deferred that has already succeeded with a constant `value`.
///
/// Same as [`success`]; reads better as the seed of a pipeline.
pub fn constant<T, E>(value: T) -> Deferred<T, E> {
    success(value)
}

/// Returns a deferred that has already failed.
///
/// The failure value is built with `Into<E>`. With the crate
/// [`Error`](crate::Error) this covers every way of describing a failure:
///
/// ```
/// use deferred::{Error, ErrorKind, primitives::failure};
///
/// let as_is = failure::<(), Error>(Error::Argument("negative".into()));
/// let by_kind = failure::<(), Error>(ErrorKind::Timeout);
/// let by_kind_and_message = failure::<(), Error>((ErrorKind::Argument, "negative"));
/// let by_message = failure::<(), Error>("no such user");
///
/// assert_eq!(by_message.outcome(), Some(Err(Error::Runtime("no such user".into()))));
/// # let _ = (as_is, by_kind, by_kind_and_message);
/// ```
pub fn failure<T, E>(error: impl Into<E>) -> Deferred<T, E> {
    let deferred = blank();
    deferred.fail(error.into());
    deferred
}

/// Returns a fresh pending deferred with no handlers.
pub fn blank<T, E>() -> Deferred<T, E> {
    Deferred::new()
}

/// The resolve function handed to the block of [`deferrably`].
///
/// Cloneable, so it can be passed to callback-style APIs that expect to own
/// their callback.
pub struct Resolver<T, E> {
    deferred: Deferred<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
        }
    }
}

impl<T, E> Resolver<T, E> {
    /// Succeeds the deferred with `value`.
    pub fn resolve(&self, value: T) {
        self.deferred.succeed(value);
    }

    /// Fails the deferred with `error`.
    pub fn reject(&self, error: E) {
        self.deferred.fail(error);
    }

    /// Converts the resolver into a plain callback that succeeds the deferred.
    pub fn into_callback(self) -> impl Fn(T) {
        move |value| self.resolve(value)
    }
}

/// Adapts callback-style code into a [`Deferred`].
///
/// `block` receives a [`Resolver`]; the returned deferred succeeds when the
/// resolver is called. If `block` itself returns an error, the deferred fails
/// with it. Handler panics triggered by calling the resolver are not caught.
///
/// ```
/// use deferred::primitives::deferrably;
///
/// fn fetch(on_done: impl Fn(u32)) {
///     on_done(42);
/// }
///
/// let fetched = deferrably::<_, String, _>(|resolver| {
///     fetch(resolver.into_callback());
///     Ok(())
/// });
/// assert_eq!(fetched.outcome(), Some(Ok(42)));
/// ```
pub fn deferrably<T, E, F>(block: F) -> Deferred<T, E>
where
    F: FnOnce(Resolver<T, E>) -> Result<(), E>,
{
    let deferred = blank();
    let resolver = Resolver {
        deferred: deferred.clone(),
    };
    if let Err(error) = block(resolver) {
        deferred.fail(error);
    }
    deferred
}

/// Lifts a plain fallible function into one returning a settled deferred.
///
/// Handy as a step of [`chain`](crate::combinators::chain) or as the argument
/// of [`bind`](crate::Deferred::bind).
pub fn lift<T, U, E, F>(f: F) -> impl FnOnce(T) -> Deferred<U, E>
where
    F: FnOnce(T) -> Result<U, E>,
{
    move |value| match f(value) {
        Ok(value) => success(value),
        Err(error) => failure(error),
    }
}
