use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::future::Future;
use crate::lock_many::OrderedGuards;
use crate::waiter::{AllCompletedWaiter, FirstCompletedWaiter, WaiterSink};

/// Which completion event should cause [`wait`] to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnWhen {
    /// Return as soon as any input Future finishes or is cancelled.
    FirstCompleted,
    /// Return as soon as any input Future finishes by raising an error.
    /// Behaves like `AllCompleted` if no input ever raises.
    FirstException,
    /// Return only once every input Future finishes or is cancelled.
    AllCompleted,
}

/// The outcome of [`wait`]: the Futures that were done when it returned,
/// and the ones that were not.
#[derive(Debug)]
pub struct WaitResult<T> {
    pub done: HashSet<Future<T>>,
    pub not_done: HashSet<Future<T>>,
}

enum BulkWaiter<T> {
    First(Arc<FirstCompletedWaiter<T>>),
    All(Arc<AllCompletedWaiter<T>>),
}

impl<T: Send + Sync + 'static> BulkWaiter<T> {
    fn as_sink(&self) -> Arc<dyn WaiterSink<T>> {
        match self {
            BulkWaiter::First(w) => w.clone(),
            BulkWaiter::All(w) => w.clone(),
        }
    }

    fn wait_timeout(&self, timeout: Option<Duration>) -> bool {
        match self {
            BulkWaiter::First(w) => w.wait_timeout(timeout),
            BulkWaiter::All(w) => w.wait_timeout(timeout),
        }
    }

    fn finished_futures(&self) -> Vec<Future<T>> {
        match self {
            BulkWaiter::First(w) => w.finished_futures(),
            BulkWaiter::All(w) => w.finished_futures(),
        }
    }
}

/// Blocks the calling thread until `return_when` is satisfied or `timeout`
/// elapses, then reports which of `futures` are done and which are not.
///
/// Mirrors `concurrent.futures.wait`: a `timeout` of `None` blocks
/// indefinitely; `Some(Duration::ZERO)` samples the current state without
/// waiting. Duplicate Futures in `futures` are deduplicated, matching
/// `set(fs)` in the original.
///
/// # Examples
///
/// ```
/// use cofuture::{wait, Future, ReturnWhen};
///
/// let f1 = Future::<i32>::new();
/// f1.start_or_observe_cancel();
/// f1.set_result(1);
/// let f2 = Future::<i32>::new();
///
/// let result = wait(&[f1.clone(), f2.clone()], None, ReturnWhen::FirstCompleted);
/// assert!(result.done.contains(&f1));
/// assert!(result.not_done.contains(&f2));
/// ```
pub fn wait<T: Send + Sync + 'static>(
    futures: &[Future<T>],
    timeout: Option<Duration>,
    return_when: ReturnWhen,
) -> WaitResult<T> {
    let (mut done, not_done, waiter): (HashSet<Future<T>>, HashSet<Future<T>>, BulkWaiter<T>) = {
        let mut guards = OrderedGuards::lock_all(futures);

        // A plain `Cancelled` future is not yet settled: its Executor still
        // owes it a call to `start_or_observe_cancel`, which is what
        // actually notifies any installed Waiter. Counting it as done here
        // would let `AllCompleted` return before that notification ever
        // arrives.
        let mut done = HashSet::new();
        let mut not_done = HashSet::new();
        for future in futures {
            if Future::is_settled_locked(guards.get_mut(future)) {
                done.insert(future.clone());
            } else {
                not_done.insert(future.clone());
            }
        }

        let early_return = match return_when {
            ReturnWhen::FirstCompleted => !done.is_empty(),
            ReturnWhen::FirstException => {
                !done.is_empty()
                    && done
                        .iter()
                        .any(|f| Future::is_finished_with_exception_locked(guards.get_mut(f)))
            }
            ReturnWhen::AllCompleted => false,
        };

        if early_return || done.len() == futures_len(futures) {
            return WaitResult { done, not_done };
        }

        let waiter = match return_when {
            ReturnWhen::FirstCompleted => BulkWaiter::First(Arc::new(FirstCompletedWaiter::new())),
            ReturnWhen::FirstException | ReturnWhen::AllCompleted => {
                // A CANCELLED future not yet promoted to CANCELLED_AND_NOTIFIED
                // still counts as pending: the Executor will notify it later.
                let pending = not_done.len();
                BulkWaiter::All(Arc::new(AllCompletedWaiter::new(
                    pending,
                    return_when == ReturnWhen::FirstException,
                )))
            }
        };

        let sink = waiter.as_sink();
        for future in &not_done {
            guards.get_mut(future).waiters.push(sink.clone());
        }

        // Guards are dropped here, releasing every Future's condition before
        // we block on the waiter's event.
        (done, not_done, waiter)
    };

    waiter.wait_timeout(timeout);

    for future in &not_done {
        let sink = waiter.as_sink();
        future.remove_waiter(&sink);
    }

    done.extend(waiter.finished_futures());
    let not_done = not_done.difference(&done).cloned().collect();

    WaitResult { done, not_done }
}

fn futures_len<T>(futures: &[Future<T>]) -> usize {
    let mut seen: HashSet<&Future<T>> = HashSet::new();
    for f in futures {
        seen.insert(f);
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_removes_waiter_from_every_input() {
        let f1 = Future::<i32>::new();
        let f2 = Future::<i32>::new();

        let result = wait(
            &[f1.clone(), f2.clone()],
            Some(Duration::from_millis(0)),
            ReturnWhen::AllCompleted,
        );
        assert!(result.done.is_empty());

        assert_eq!(f1.lock().waiters.len(), 0);
        assert_eq!(f2.lock().waiters.len(), 0);
    }

    #[test]
    fn cancelled_but_unnotified_future_does_not_count_as_done() {
        let f1 = Future::<i32>::new();
        f1.start_or_observe_cancel();
        f1.set_result(1);
        let f2 = Future::<i32>::new();
        f2.cancel();

        // f2 is Cancelled but its Executor has not yet promoted it to
        // CancelledAndNotified, so AllCompleted must keep waiting for it
        // instead of returning immediately with both futures in `done`.
        let result = wait(
            &[f1.clone(), f2.clone()],
            Some(Duration::from_millis(10)),
            ReturnWhen::AllCompleted,
        );
        assert!(result.done.contains(&f1));
        assert!(result.not_done.contains(&f2));
    }

    #[test]
    fn duplicate_inputs_are_locked_and_waited_on_once() {
        let f1 = Future::<i32>::new();
        f1.start_or_observe_cancel();
        f1.set_result(1);

        let result = wait(
            &[f1.clone(), f1.clone()],
            None,
            ReturnWhen::AllCompleted,
        );
        assert_eq!(result.done.len(), 1);
        assert!(result.not_done.is_empty());
    }
}
