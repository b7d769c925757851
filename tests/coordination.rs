use std::sync::mpsc::channel;
use std::thread;
use std::time::Duration;

use cofuture::{as_completed, wait, Error, Executor, Future, ReturnWhen, ThreadPoolExecutor};

#[test]
fn as_completed_yields_futures_in_observed_completion_order() {
    let f1 = Future::<&'static str>::new();
    let f2 = Future::<&'static str>::new();

    let (tx, rx) = channel();
    let worker1 = f1.clone();
    let worker2 = f2.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        worker1.start_or_observe_cancel();
        worker1.set_result("a");
        thread::sleep(Duration::from_millis(10));
        worker2.start_or_observe_cancel();
        worker2.set_result("b");
        tx.send(()).unwrap();
    });

    let order: Vec<&'static str> = as_completed(&[f1.clone(), f2.clone()], None)
        .map(|r| r.unwrap().result(None).unwrap())
        .collect();
    rx.recv().unwrap();

    assert_eq!(order, vec!["a", "b"]);
}

#[test]
fn wait_first_exception_returns_immediately_when_one_input_already_failed() {
    #[derive(Debug)]
    struct Boom;
    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }
    impl std::error::Error for Boom {}

    let f1 = Future::<i32>::new();
    let f2 = Future::<i32>::new();
    f2.start_or_observe_cancel();
    f2.set_exception(Boom);

    let result = wait(&[f1.clone(), f2.clone()], None, ReturnWhen::FirstException);

    assert!(result.done.contains(&f2));
    assert!(!result.done.contains(&f1));
    assert!(result.not_done.contains(&f1));
}

#[test]
fn wait_all_completed_times_out_and_clears_waiter_sets() {
    let f1 = Future::<i32>::new();
    let f2 = Future::<i32>::new();

    let result = wait(
        &[f1.clone(), f2.clone()],
        Some(Duration::from_millis(10)),
        ReturnWhen::AllCompleted,
    );

    assert!(result.done.is_empty());
    assert_eq!(result.not_done.len(), 2);

    // The timed-out waiter must have been removed from both Futures: a
    // second, successful wait on the same Futures should not see any stale
    // notification from the first one.
    f1.start_or_observe_cancel();
    f1.set_result(1);
    f2.start_or_observe_cancel();
    f2.set_result(2);
    let result = wait(&[f1, f2], None, ReturnWhen::AllCompleted);
    assert_eq!(result.done.len(), 2);
}

#[test]
fn map_timeout_cancels_unconsumed_futures() {
    let pool = ThreadPoolExecutor::new(3, None);
    let mut iter = pool
        .map(
            |_: i32| {
                thread::sleep(Duration::from_secs(1));
                0
            },
            vec![1, 2, 3],
            Some(Duration::from_millis(1)),
        )
        .unwrap();

    let first = iter.next().unwrap();
    assert!(matches!(first, Err(Error::Timeout { .. })));
    drop(iter);
}
