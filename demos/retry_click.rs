//! Keeps "clicking" a flaky button until it works, giving up after a while.
//!
//! Every click settles on a timer, and fails until the fourth try. The retry
//! loop runs on the event loop, so the status ticker keeps running between
//! attempts.

use std::{cell::Cell, rc::Rc, time::Duration};

use deferred::{Deferred, Driver, Error, EventLoop, LoopHandle, Reactor, repeat::loop_until_success};

fn click(handle: &LoopHandle, attempt: u32) -> Deferred<String, Error> {
    let result = Deferred::new();
    let settle = result.clone();
    handle.schedule_timer(
        Duration::from_millis(50),
        Box::new(move || {
            if attempt < 4 {
                settle.fail(Error::from(format!("click {attempt} was ignored")));
            } else {
                settle.succeed(format!("button pressed on click {attempt}"));
            }
        }),
    );
    result
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("deferred=debug").init();

    let mut event_loop = EventLoop::new()?;
    let handle = event_loop.handle();

    let attempts = Rc::new(Cell::new(0));
    let (clicker, counter) = (handle.clone(), Rc::clone(&attempts));
    let pressed = loop_until_success(&Driver::reactor(handle.clone()), move || {
        counter.set(counter.get() + 1);
        click(&clicker, counter.get())
    });
    pressed.timeout(&handle, Duration::from_secs(2));
    pressed.on_failure(|error| eprintln!("giving up: {error}"));

    println!("{}", event_loop.block_on(&pressed)?);
    println!("took {} clicks", attempts.get());
    Ok(())
}
