use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::future::Future;
use crate::lock_many::OrderedGuards;
use crate::waiter::{AsCompletedWaiter, WaiterSink};

/// Streaming iterator returned by [`crate::as_completed`]. Yields each input
/// Future exactly once, in completion-observation order, blocking as needed
/// up to an overall deadline computed once on construction.
pub struct AsCompleted<T: Send + Sync + 'static> {
    waiter: Arc<AsCompletedWaiter<T>>,
    sink: Arc<dyn WaiterSink<T>>,
    pending: VecDeque<Future<T>>,
    active: HashSet<Future<T>>,
    total: usize,
    deadline: Option<Instant>,
}

/// Builds an iterator over `fs` that yields each Future as it completes.
///
/// Duplicate Futures in `fs` are yielded once. `timeout`, when set, bounds
/// the entire iteration: the deadline is computed once here, not reset on
/// each call to `next`.
///
/// # Examples
///
/// ```
/// use cofuture::{as_completed, Future};
///
/// let f1 = Future::<i32>::new();
/// f1.start_or_observe_cancel();
/// f1.set_result(1);
///
/// let done: Vec<_> = as_completed(&[f1.clone()], None).collect();
/// assert_eq!(done.len(), 1);
/// assert!(done[0].is_ok());
/// ```
pub fn as_completed<T: Send + Sync + 'static>(
    fs: &[Future<T>],
    timeout: Option<Duration>,
) -> AsCompleted<T> {
    let deadline = timeout.map(|t| Instant::now() + t);

    let mut unique = Vec::with_capacity(fs.len());
    for f in fs {
        if !unique.iter().any(|u: &Future<T>| u.id() == f.id()) {
            unique.push(f.clone());
        }
    }

    let waiter = Arc::new(AsCompletedWaiter::new());
    let sink: Arc<dyn WaiterSink<T>> = waiter.clone();

    let mut pending = VecDeque::new();
    let mut active = HashSet::new();

    {
        let mut guards = OrderedGuards::lock_all(&unique);
        for future in &unique {
            let guard = guards.get_mut(future);
            future.install_waiter(guard, sink.clone());
            // A plain `Cancelled` future hasn't been notified yet — its
            // Executor will push it through the waiter once it calls
            // `start_or_observe_cancel`, so it must not be snapshotted here.
            if Future::is_settled_locked(guard) {
                pending.push_back(future.clone());
            }
            active.insert(future.clone());
        }
        // guards drop here, before anything can block on the waiter.
    }

    let total = active.len();
    AsCompleted {
        waiter,
        sink,
        pending,
        active,
        total,
        deadline,
    }
}

impl<T: Send + Sync + 'static> AsCompleted<T> {
    fn timeout_err(&self) -> Error {
        Error::Timeout {
            remaining: self.active.len(),
            total: self.total,
        }
    }

    /// Removes `future` from internal tracking and its own waiter set before
    /// handing it back, so no stale reference to it survives the call.
    fn take(&mut self, future: Future<T>) -> Future<T> {
        self.active.remove(&future);
        future.remove_waiter(&self.sink);
        future
    }
}

impl<T: Send + Sync + 'static> Iterator for AsCompleted<T> {
    type Item = std::result::Result<Future<T>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(future) = self.pending.pop_front() {
                return Some(Ok(self.take(future)));
            }

            if self.active.is_empty() {
                return None;
            }

            let wait_timeout = match self.deadline {
                None => None,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Some(Err(self.timeout_err()));
                    }
                    Some(deadline - now)
                }
            };

            if !self.waiter.wait_timeout(wait_timeout) {
                return Some(Err(self.timeout_err()));
            }

            // Already in observed-completion order: the waiter appends each
            // notification at the back as it arrives, and we drain into a
            // FIFO, so no reordering is needed to keep the earliest-observed
            // completion first.
            let batch = self.waiter.drain();
            self.pending.extend(batch);
        }
    }
}

impl<T: Send + Sync + 'static> Drop for AsCompleted<T> {
    fn drop(&mut self) {
        for future in self.active.drain() {
            future.remove_waiter(&self.sink);
        }
        for future in self.pending.drain(..) {
            future.remove_waiter(&self.sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn yields_already_terminal_futures_without_blocking() {
        let f1 = Future::<i32>::new();
        f1.start_or_observe_cancel();
        f1.set_result(1);
        let f2 = Future::<i32>::new();
        f2.start_or_observe_cancel();
        f2.set_result(2);

        let results: Vec<i32> = as_completed(&[f1, f2], None)
            .map(|r| r.unwrap().result(None).unwrap())
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results.contains(&1));
        assert!(results.contains(&2));
    }

    #[test]
    fn cancelled_but_unnotified_future_is_not_snapshotted_as_done() {
        let f1 = Future::<i32>::new();
        f1.cancel();

        // f1 is Cancelled but not yet CancelledAndNotified: it must not be
        // yielded until its Executor actually promotes it, so a short
        // timeout should time out rather than yield it immediately.
        let mut iter = as_completed(&[f1], Some(Duration::from_millis(10)));
        assert!(matches!(iter.next(), Some(Err(Error::Timeout { .. }))));
    }

    #[test]
    fn duplicates_are_yielded_once() {
        let f1 = Future::<i32>::new();
        f1.start_or_observe_cancel();
        f1.set_result(1);

        let count = as_completed(&[f1.clone(), f1.clone(), f1], None).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn yields_as_completions_arrive_from_another_thread() {
        let f1 = Future::<i32>::new();
        let f2 = Future::<i32>::new();
        let worker1 = f1.clone();
        let worker2 = f2.clone();
        thread::spawn(move || {
            worker1.start_or_observe_cancel();
            worker1.set_result(1);
            thread::sleep(Duration::from_millis(10));
            worker2.start_or_observe_cancel();
            worker2.set_result(2);
        });

        let order: Vec<i32> = as_completed(&[f1, f2], None)
            .map(|r| r.unwrap().result(None).unwrap())
            .collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn times_out_while_pending() {
        let f1 = Future::<i32>::new();
        let mut iter = as_completed(&[f1], Some(Duration::from_millis(0)));
        let err = iter.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Timeout { remaining: 1, total: 1 }));
    }

    #[test]
    fn waiter_is_removed_from_futures_left_pending_after_timeout() {
        let f1 = Future::<i32>::new();
        {
            let mut iter = as_completed(&[f1.clone()], Some(Duration::from_millis(0)));
            let _ = iter.next();
        }
        assert_eq!(f1.lock().waiters.len(), 0);
    }
}
