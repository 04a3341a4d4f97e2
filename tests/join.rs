mod common;

use std::time::{Duration, Instant};

use common::init_test_logging;
use deferred::{
    Deferred, Error, FirstSuccessError,
    join::{in_parallel, join_first_success, join_successes},
    primitives::{failure, success},
};
use proptest::prelude::*;

#[test]
fn successes_follow_input_order_not_arrival_order() {
    init_test_logging();
    let (a, b) = (Deferred::<u32, Error>::new(), Deferred::new());
    let all = join_successes([a.clone(), b.clone()]);

    b.succeed(2);
    assert!(all.is_pending());
    a.succeed(1);

    assert_eq!(all.outcome(), Some(Ok(vec![1, 2])));
}

#[test]
fn successes_never_fail() {
    let all = join_successes([failure::<u32, Error>("a"), failure("b")]);
    assert_eq!(all.outcome(), Some(Ok(vec![])));
}

#[test]
fn first_success_takes_the_chronologically_first() {
    let (a, b) = (Deferred::<&str, Error>::new(), Deferred::new());
    let first = join_first_success([a.clone(), b.clone()]);

    b.succeed("b");
    a.succeed("a");

    assert_eq!(first.outcome(), Some(Ok("b")));
}

#[test]
fn first_success_ignores_failures_while_something_can_still_succeed() {
    let (a, b) = (Deferred::<u8, Error>::new(), Deferred::new());
    let first = join_first_success([a.clone(), b.clone()]);

    a.fail(Error::from("a"));
    assert!(first.is_pending());
    b.succeed(2);

    assert_eq!(first.outcome(), Some(Ok(2)));
}

#[test]
fn first_success_fails_when_everything_fails() {
    let first = join_first_success([failure::<u8, Error>("a"), failure("b")]);
    assert_eq!(
        first.outcome(),
        Some(Err(FirstSuccessError::AllFailed(vec![Error::from("a"), Error::from("b")])))
    );
}

#[test]
fn in_parallel_partitions_outcomes() {
    let (a, b, c) = (Deferred::<u8, Error>::new(), Deferred::new(), Deferred::new());
    let both = in_parallel([a.clone(), b.clone(), c.clone()]);

    c.fail(Error::from("c"));
    a.succeed(1);
    assert!(both.is_pending());
    b.fail(Error::from("b"));

    assert_eq!(
        both.outcome(),
        Some(Ok((vec![1], vec![Error::from("b"), Error::from("c")])))
    );
}

#[test]
fn joins_accept_already_settled_inputs() {
    let mixed = in_parallel([success::<u8, Error>(1), failure("x"), success(3)]);
    assert_eq!(mixed.outcome(), Some(Ok((vec![1, 3], vec![Error::from("x")]))));
}

#[test]
fn large_joins_take_linear_time() {
    let inputs: Vec<Deferred<u32, Error>> = (0..200_000).map(|_| Deferred::new()).collect();
    let start = Instant::now();
    let all = join_successes(inputs.clone());
    for input in &inputs {
        input.fail(Error::from("refused"));
    }
    assert_eq!(all.outcome(), Some(Ok(vec![])));
    assert!(start.elapsed() < Duration::from_secs(30), "took {:?}", start.elapsed());
}

proptest! {
    #[test]
    fn successes_keep_input_order_for_any_arrival_order(
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle(),
        failing in proptest::collection::vec(any::<bool>(), 8),
    ) {
        let inputs: Vec<Deferred<usize, Error>> = (0..8).map(|_| Deferred::new()).collect();
        let all = join_successes(inputs.clone());

        for &index in &order {
            if failing[index] {
                inputs[index].fail(Error::from("failed"));
            } else {
                inputs[index].succeed(index);
            }
        }

        let expected: Vec<usize> = (0..8).filter(|i| !failing[*i]).collect();
        prop_assert_eq!(all.outcome(), Some(Ok(expected)));
    }
}
