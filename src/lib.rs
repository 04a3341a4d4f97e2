//! Composable single-fire deferred results for callback-driven code.
//!
//! `deferred` lets asynchronous, callback-style operations be sequenced,
//! transformed, raced and retried like ordinary expressions, without wiring up
//! success and failure propagation by hand.
//!
//! The building block is [`Deferred`], a result that is settled exactly when
//! its producer calls [`succeed`](Deferred::succeed) or
//! [`fail`](Deferred::fail), and which dispatches to handler queues. On top of
//! it the crate offers:
//! - Primitives for already-known outcomes and for adapting callback APIs
//!   ([`primitives`])
//! - Sequencing combinators: [`bind`](Deferred::bind) (also `>>`),
//!   [`map`](Deferred::map), [`transform_error`](Deferred::transform_error),
//!   [`guard`](Deferred::guard), [`rescue_from`](Deferred::rescue_from) and
//!   [`chain`](combinators::chain)
//! - Joins waiting on many deferreds at once ([`join`])
//! - Retry and while/until loops ([`repeat`])
//! - A [`Reactor`] boundary for scheduling and timers, with a small
//!   [`EventLoop`] implementation
//!
//! Deferreds are single-threaded and runtime agnostic. They can be awaited
//! from any executor through `IntoFuture`.
//!
//! ```
//! use deferred::{Error, ErrorKind, primitives::success};
//!
//! let price = success::<u32, Error>(120)
//!     .guard("must be affordable", |cents| *cents < 100)
//!     .rescue_from_default([ErrorKind::Guard]);
//!
//! assert_eq!(price.outcome(), Some(Ok(0)));
//! ```

mod aggregate;
pub mod combinators;
pub mod deferred;
pub mod error;
pub mod event_loop;
pub mod future_ext;
pub mod join;
pub mod primitives;
pub mod reactor;
pub mod repeat;
pub mod timing;

pub use combinators::{Bound, IntoBound, IntoVerdict};
pub use deferred::{Deferred, Settled, Status};
pub use error::{Error, ErrorKind, GuardFailed, Rescue, TimedOut};
pub use event_loop::{EventLoop, EventLoopBuilder, LoopHandle};
pub use future_ext::DeferExt;
pub use join::FirstSuccessError;
pub use reactor::{Driver, Reactor, TimerHandle};
