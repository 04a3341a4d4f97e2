mod common;

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use common::init_test_logging;
use deferred::{
    DeferExt, Deferred, Error, ErrorKind, EventLoop, Reactor, TimedOut,
    primitives::{blank, deferrably},
};

#[test]
fn timeout_fails_a_pending_deferred() {
    init_test_logging();
    let mut event_loop = EventLoop::builder()
        .timer_threads(1)
        .thread_name_prefix("deferred-timer-")
        .build()
        .unwrap();
    let handle = event_loop.handle();

    let d: Deferred<u8, Error> = blank();
    d.timeout(&handle, Duration::from_millis(15));

    let error = event_loop.block_on(&d).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert_eq!(error, Error::Timeout(TimedOut::after(Duration::from_millis(15))));
}

#[test]
fn settling_first_cancels_the_timeout() {
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();

    let d: Deferred<u8, Error> = blank();
    d.timeout(&handle, Duration::from_secs(600));
    let producer = d.clone();
    handle.schedule_next(Box::new(move || producer.succeed(1)));

    let start = Instant::now();
    assert_eq!(event_loop.block_on(&d), Ok(1));
    event_loop.run();
    assert!(start.elapsed() < Duration::from_secs(60), "cancelled timer kept the loop busy");
}

#[test]
fn a_second_timeout_replaces_the_first() {
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();

    let d: Deferred<u8, TimedOut> = blank();
    d.timeout(&handle, Duration::from_millis(5));
    d.timeout(&handle, Duration::from_millis(40));

    let error = event_loop.block_on(&d).unwrap_err();
    assert_eq!(error.limit(), Some(Duration::from_millis(40)));
}

#[test]
fn timeout_on_a_settled_deferred_does_nothing() {
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let d: Deferred<u8, Error> = deferred::primitives::success(3);
    d.timeout(&handle, Duration::from_millis(1));
    event_loop.run();
    assert_eq!(d.outcome(), Some(Ok(3)));
}

#[test]
fn spawned_futures_settle_deferreds() {
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();

    let ok = handle.spawn(async { Ok::<_, Error>("fetched") });
    let failed = async { Err::<u8, _>(Error::from("unreachable host")) }.defer_on(&handle);
    event_loop.run();

    assert_eq!(ok.outcome(), Some(Ok("fetched")));
    assert_eq!(failed.outcome(), Some(Err(Error::from("unreachable host"))));
}

#[test]
fn delayed_futures_wait_on_timer_threads() {
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();

    let start = Instant::now();
    let late = async move { Ok::<_, Error>(start.elapsed()) }
        .delay(Duration::from_millis(20), &handle)
        .defer_on(&handle);

    let waited = event_loop.block_on(&late).unwrap();
    assert!(waited >= Duration::from_millis(20));
}

#[test]
fn deferrably_adapts_callbacks_scheduled_on_the_loop() {
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();

    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let answer = deferrably::<u32, Error, _>(|resolver| {
        handle.schedule_timer(
            Duration::from_millis(1),
            Box::new(move || {
                counter.set(counter.get() + 1);
                resolver.resolve(42);
            }),
        );
        Ok(())
    });

    assert!(answer.is_pending());
    assert_eq!(event_loop.block_on(&answer), Ok(42));
    assert_eq!(calls.get(), 1);
}
