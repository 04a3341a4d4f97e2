//! Races a slow lookup against a timeout and a faster mirror.

use std::time::Duration;

use deferred::{
    DeferExt, Error, ErrorKind, EventLoop,
    join::{in_parallel, join_first_success},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut event_loop = EventLoop::new()?;
    let handle = event_loop.handle();

    let primary = async { Ok::<_, Error>("primary") }
        .delay(Duration::from_millis(500), &handle)
        .defer_on(&handle)
        .timeout(&handle, Duration::from_millis(100));
    let mirror = async { Ok::<_, Error>("mirror") }
        .delay(Duration::from_millis(30), &handle)
        .defer_on(&handle);

    let first = join_first_success([primary.clone(), mirror.clone()]);
    let everything = in_parallel([primary, mirror]);

    println!("first answer: {}", event_loop.block_on(&first)?);

    let (answers, errors) = event_loop.block_on(&everything)?;
    println!("answers: {answers:?}");
    for error in errors {
        match error.kind() {
            ErrorKind::Timeout => println!("timed out: {error}"),
            _ => println!("failed: {error}"),
        }
    }
    Ok(())
}
