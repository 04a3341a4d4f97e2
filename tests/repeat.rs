mod common;

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use common::{Log, init_test_logging};
use deferred::{
    Deferred, Driver, Error, ErrorKind, EventLoop, Reactor,
    primitives::{failure, success},
    repeat::{loop_until, loop_until_failure, loop_until_success, loop_while},
};

#[test]
fn retries_until_the_fourth_attempt_succeeds() {
    init_test_logging();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let result = loop_until_success(&Driver::inline(), move || {
        counter.set(counter.get() + 1);
        match counter.get() {
            n if n < 4 => failure::<u32, Error>(format!("attempt {n} failed")),
            n => success(n * 100),
        }
    });

    assert_eq!(result.outcome(), Some(Ok(400)));
    assert_eq!(calls.get(), 4);
}

#[test]
fn inline_loops_do_not_grow_the_stack() {
    let calls = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&calls);
    let result = loop_until_success(&Driver::inline(), move || {
        counter.set(counter.get() + 1);
        if counter.get() < 100_000 {
            failure::<u32, Error>("again")
        } else {
            success(counter.get())
        }
    });
    assert_eq!(result.outcome(), Some(Ok(100_000)));
}

#[test]
fn long_retry_sequences_take_linear_time() {
    let calls = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&calls);
    let start = Instant::now();
    let result = loop_until_success(&Driver::inline(), move || {
        counter.set(counter.get() + 1);
        if counter.get() < 300_000 {
            failure::<u32, Error>("again")
        } else {
            success(counter.get())
        }
    });
    assert_eq!(result.outcome(), Some(Ok(300_000)));
    assert!(start.elapsed() < Duration::from_secs(30), "took {:?}", start.elapsed());
}

#[test]
fn inline_loops_resume_when_a_pending_attempt_settles() {
    let attempts = Rc::new(std::cell::RefCell::new(Vec::<Deferred<u8, Error>>::new()));
    let started = Rc::clone(&attempts);
    let result = loop_until_success(&Driver::inline(), move || {
        let attempt = Deferred::new();
        started.borrow_mut().push(attempt.clone());
        attempt
    });

    let first = attempts.borrow()[0].clone();
    first.fail(Error::from("busy"));
    assert_eq!(attempts.borrow().len(), 2);

    let second = attempts.borrow()[1].clone();
    second.succeed(7);
    assert_eq!(result.outcome(), Some(Ok(7)));
    assert_eq!(attempts.borrow().len(), 2);
}

#[test]
fn until_failure_reports_the_failing_attempt() {
    let log = Log::new();
    let attempts = log.clone();
    let result = loop_until_failure(&Driver::inline(), move || {
        attempts.push("tick");
        if attempts.len() < 3 {
            success::<(), Error>(())
        } else {
            failure((ErrorKind::Argument, "queue drained"))
        }
    });
    assert_eq!(result.outcome(), Some(Err(Error::Argument("queue drained".into()))));
    assert_eq!(log.len(), 3);
}

#[test]
fn while_returns_the_last_success_value() {
    let next = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&next);
    let result = loop_while(
        &Driver::inline(),
        |last: Option<&u32>| last.is_none_or(|v| *v < 5),
        move || {
            counter.set(counter.get() + 1);
            success::<u32, Error>(counter.get())
        },
    );
    assert_eq!(result.outcome(), Some(Ok(Some(5))));
}

#[test]
fn until_is_while_negated() {
    let next = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&next);
    let result = loop_until(
        &Driver::inline(),
        |last: Option<&u32>| last.is_some_and(|v| *v >= 3),
        move || {
            counter.set(counter.get() + 1);
            Ok::<_, Error>(deferred::Bound::Value(counter.get()))
        },
    );
    assert_eq!(result.outcome(), Some(Ok(Some(3))));
    assert_eq!(next.get(), 3);
}

#[test]
fn while_fails_when_the_condition_errors() {
    let result = loop_while(
        &Driver::inline(),
        |last: Option<&u32>| match last {
            Some(_) => Err(Error::from("condition broke")),
            None => Ok(true),
        },
        || success::<u32, Error>(1),
    );
    assert_eq!(result.outcome(), Some(Err(Error::from("condition broke"))));
}

#[test]
fn while_fails_with_the_first_failed_attempt() {
    let result = loop_while(
        &Driver::inline(),
        |_: Option<&u32>| true,
        || failure::<u32, Error>("lost connection"),
    );
    assert_eq!(result.outcome(), Some(Err(Error::from("lost connection"))));
}

#[test]
fn reactor_driver_interleaves_other_work() {
    init_test_logging();
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let log = Log::new();

    let (attempts, driver_handle) = (log.clone(), handle.clone());
    let other = log.clone();
    let result: Rc<std::cell::RefCell<Option<Deferred<u32, Error>>>> = Rc::default();
    let slot = Rc::clone(&result);

    handle.schedule_next(Box::new(move || {
        let driver = Driver::detect(driver_handle.clone());
        assert!(driver.is_reactor());
        let tries = Rc::new(Cell::new(0));
        let looped = loop_until_success(&driver, move || {
            tries.set(tries.get() + 1);
            attempts.push(format!("attempt {}", tries.get()));
            if tries.get() < 3 {
                failure::<u32, Error>("not yet")
            } else {
                success(tries.get())
            }
        });
        *slot.borrow_mut() = Some(looped);
        driver_handle.schedule_next(Box::new(move || other.push("other work")));
    }));
    event_loop.run();

    let entries = log.entries();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0], "attempt 1");
    assert!(entries.iter().position(|e| e == "other work") < entries.iter().position(|e| e == "attempt 3"));
    let looped = result.borrow().clone();
    assert_eq!(looped.and_then(|d| d.outcome()), Some(Ok(3)));
}

#[test]
fn a_timeout_on_the_result_stops_retrying() {
    let mut event_loop = EventLoop::new().unwrap();
    let handle = event_loop.handle();
    let calls = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&calls);

    let timers = handle.clone();
    let forever = loop_until_success(&Driver::reactor(handle.clone()), move || {
        counter.set(counter.get() + 1);
        let attempt: Deferred<u32, Error> = Deferred::new();
        let refused = attempt.clone();
        timers.schedule_timer(
            Duration::from_millis(2),
            Box::new(move || refused.fail(Error::from("refused"))),
        );
        attempt
    });
    forever.timeout(&handle, Duration::from_millis(30));

    let outcome = event_loop.block_on(&forever);
    assert_eq!(outcome.map_err(|e| e.kind()), Err(ErrorKind::Timeout));
    assert!(calls.get() >= 1);

    let after_timeout = calls.get();
    event_loop.run();
    assert_eq!(calls.get(), after_timeout);
}
