//! Looks up a user's products through two fake asynchronous queries.
//!
//! Each query settles on a later turn of the event loop. The lookups are
//! sequenced with `>>`, validated with `guard`, and a missing user is rescued
//! into an empty listing.

use deferred::{
    Deferred, Error, ErrorKind, EventLoop, LoopHandle, Reactor, primitives::constant,
};

fn query<T: 'static>(handle: &LoopHandle, answer: Result<T, Error>) -> Deferred<T, Error> {
    let result = Deferred::new();
    let settle = result.clone();
    handle.schedule_next(Box::new(move || match answer {
        Ok(value) => settle.succeed(value),
        Err(error) => settle.fail(error),
    }));
    result
}

fn user_id(handle: &LoopHandle, name: &str) -> Deferred<u32, Error> {
    match name {
        "bob" => query(handle, Ok(42)),
        _ => query(handle, Err(Error::new(ErrorKind::Argument, format!("no user named {name}")))),
    }
}

fn products(handle: &LoopHandle, user_id: u32) -> Deferred<Vec<String>, Error> {
    query(handle, Ok(vec![format!("spoon #{user_id}"), "car".to_owned(), "cheese".to_owned()]))
}

fn listing(handle: &LoopHandle, name: &'static str) -> Deferred<String, Error> {
    let (by_name, by_id) = (handle.clone(), handle.clone());
    let found = constant::<&str, Error>(name)
        >> (move |name: &str| user_id(&by_name, name))
        >> (move |id: u32| products(&by_id, id));
    found
        .guard("must own something", |products| !products.is_empty())
        .map(|products| products.join(", "))
        .rescue_from([ErrorKind::Argument], |_| Ok("(nobody)".to_owned()))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let mut event_loop = EventLoop::new()?;
    let handle = event_loop.handle();

    for name in ["bob", "alice"] {
        let products = listing(&handle, name);
        println!("{name}: {}", event_loop.block_on(&products)?);
    }
    Ok(())
}
