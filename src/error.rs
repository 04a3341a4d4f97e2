//! Error values produced by the library and the matchers used to rescue them.
//!
//! Failure payloads are generic: a [`Deferred`](crate::Deferred) may fail with
//! any `E`. Whenever the library itself has to fail something (a guard that
//! rejected its arguments, a timeout that fired) it builds a small dedicated
//! value and converts it into the caller's `E` with `From`. The crate-level
//! [`Error`] accepts every such conversion, so it is a convenient default.

use std::{fmt, time::Duration};

use thiserror::Error;

/// Failure produced by [`guard`](crate::Deferred::guard) when the predicate
/// rejects the success value.
///
/// Carries the optional human-readable reason given to the guard and the
/// arguments that failed the check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardFailed<A> {
    reason: Option<String>,
    args: A,
}

impl<A> GuardFailed<A> {
    /// Creates a guard failure for `args`, optionally explained by `reason`.
    pub fn new(reason: Option<String>, args: A) -> Self {
        Self { reason, args }
    }

    /// The reason given to the guard, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The success value that failed the predicate.
    pub fn args(&self) -> &A {
        &self.args
    }

    /// Consumes the failure and returns the offending value.
    pub fn into_args(self) -> A {
        self.args
    }
}

impl<A: fmt::Debug> fmt::Display for GuardFailed<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "guard failed: {reason} (args: {:?})", self.args),
            None => write!(f, "guard failed (args: {:?})", self.args),
        }
    }
}

impl<A: fmt::Debug> std::error::Error for GuardFailed<A> {}

/// Failure produced by [`timeout`](crate::Deferred::timeout) when a deferred
/// is still pending once its time limit elapses.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TimedOut {
    after: Option<Duration>,
    message: String,
}

impl TimedOut {
    /// A timeout that fired after `after` had elapsed.
    pub fn after(after: Duration) -> Self {
        Self {
            after: Some(after),
            message: format!("timed out after {after:?}"),
        }
    }

    /// A timeout described only by a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            after: None,
            message: message.into(),
        }
    }

    /// The time limit that elapsed, when known.
    pub fn limit(&self) -> Option<Duration> {
        self.after
    }
}

impl Default for TimedOut {
    fn default() -> Self {
        Self::new("timed out")
    }
}

/// The closed set of error kinds the crate [`Error`] can represent.
///
/// Kinds double as rescue matchers: `rescue_from([ErrorKind::Runtime], ..)`
/// only catches runtime errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Generic failure described by a message.
    Runtime,
    /// A caller passed something unusable.
    Argument,
    /// A guard predicate rejected a success value.
    Guard,
    /// A timeout fired before settlement.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Runtime => "runtime error",
            ErrorKind::Argument => "invalid argument",
            ErrorKind::Guard => "guard failed",
            ErrorKind::Timeout => "timed out",
        };
        f.write_str(name)
    }
}

/// General purpose failure value.
///
/// `&str` and `String` convert into [`Error::Runtime`], an [`ErrorKind`] builds
/// that kind with its default message, and `(ErrorKind, message)` builds the
/// kind with the given message. Guard and timeout failures convert in as well.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Generic failure described by a message.
    #[error("{0}")]
    Runtime(String),

    /// A caller passed something unusable.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A guard predicate rejected a success value; arguments are rendered
    /// with their `Debug` representation.
    #[error(transparent)]
    Guard(GuardFailed<String>),

    /// A timeout fired before settlement.
    #[error(transparent)]
    Timeout(#[from] TimedOut),
}

impl Error {
    /// Builds an error of `kind` described by `message`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Runtime => Error::Runtime(message),
            ErrorKind::Argument => Error::Argument(message),
            ErrorKind::Guard => Error::Guard(GuardFailed::new(Some(message), String::new())),
            ErrorKind::Timeout => Error::Timeout(TimedOut::new(message)),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::Argument(_) => ErrorKind::Argument,
            Error::Guard(_) => ErrorKind::Guard,
            Error::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Runtime(message.to_owned())
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Runtime(message)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Guard => Error::Guard(GuardFailed::new(None, String::new())),
            ErrorKind::Timeout => Error::Timeout(TimedOut::default()),
            other => Error::new(other, other.to_string()),
        }
    }
}

impl<S: Into<String>> From<(ErrorKind, S)> for Error {
    fn from((kind, message): (ErrorKind, S)) -> Self {
        Error::new(kind, message)
    }
}

impl<A: fmt::Debug> From<GuardFailed<A>> for Error {
    fn from(failed: GuardFailed<A>) -> Self {
        let args = format!("{:?}", failed.args);
        Error::Guard(GuardFailed::new(failed.reason, args))
    }
}

/// Decides whether a failure should be rescued by
/// [`rescue_from`](crate::Deferred::rescue_from).
///
/// Implemented for any `Fn(&E) -> bool` predicate and, for the crate
/// [`Error`], for [`ErrorKind`].
pub trait Rescue<E> {
    /// Returns `true` if `error` should be rescued.
    fn matches(&self, error: &E) -> bool;
}

impl<E, F> Rescue<E> for F
where
    F: Fn(&E) -> bool,
{
    fn matches(&self, error: &E) -> bool {
        self(error)
    }
}

impl Rescue<Error> for ErrorKind {
    fn matches(&self, error: &Error) -> bool {
        error.kind() == *self
    }
}
